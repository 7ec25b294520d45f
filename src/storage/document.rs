use std::{
    fmt,
    sync::{
        OnceLock,
        atomic::{AtomicU32, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use serde_json::{Map, Value};

pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "_id";

/// 12-byte document identity: seconds since the epoch, a per-process random
/// value, then a wrapping counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId([u8; 12]);

fn process_seed() -> &'static [u8; 5] {
    static SEED: OnceLock<[u8; 5]> = OnceLock::new();
    SEED.get_or_init(rand::random)
}

fn counter() -> &'static AtomicU32 {
    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    COUNTER.get_or_init(|| AtomicU32::new(rand::random()))
}

impl ObjectId {
    pub fn generate() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs() as u32)
            .unwrap_or_default();
        let count = counter().fetch_add(1, Ordering::Relaxed);

        let mut bytes = [0; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(process_seed());
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn bytes(&self) -> &[u8; 12] {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Renders an identity value as a plain string.
pub fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Moves `_id` to the front of `document`, generating one when absent.
/// Returns the id as a string.
pub fn assign_id(document: Document) -> (String, Document) {
    let mut document = document;
    let id = document
        .remove(ID_FIELD)
        .unwrap_or_else(|| Value::String(ObjectId::generate().to_string()));
    let rendered = id_string(&id);

    let mut ordered = Map::with_capacity(document.len() + 1);
    ordered.insert(ID_FIELD.to_string(), id);
    ordered.extend(document);
    (rendered, ordered)
}
