//! Append-only collection logs.
//!
//! [`LogStore`] keeps a database as a directory with one log file per
//! collection (`<collection>.log`). Every insert appends a [`LogEntry`] and
//! flushes it before the insert is acknowledged, so an acknowledged document
//! survives a restart.
//!
//! # Overview
//!
//! Entries are bincode-encoded with big-endian, fixed-width integers. Each one
//! records a single document as its id plus its JSON text. A collection is
//! replayed into memory the first time it is touched; replay stops at the
//! first entry that fails to decode, which drops a tail torn by a crash
//! mid-write.
//!
//! # See Also
//!
//! - [`filter`](super::filter): How replayed documents are searched.
//! - [`query`](crate::query): Requests that trigger log writes.
use std::{
    collections::HashMap,
    fs::{self, File, OpenOptions},
    io::{self, BufReader, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint},
    decode_from_reader, encode_to_vec,
};
use log::{debug, info, trace, warn};

use super::{
    DocumentStore, StorageError,
    document::{Document, ID_FIELD, assign_id},
    filter::Filter,
};

const LOG_EXTENSION: &str = "log";

/// Record appended to a collection log.
#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub enum LogEntry {
    Insert { id: String, body: String },
}

struct Collection {
    documents: Vec<Document>,
    log: File,
    /// Length of the log up to the last complete entry.
    len: u64,
}

/// File-backed document store.
pub struct LogStore {
    config: Configuration<BigEndian, Fixint>,
    dir: PathBuf,
    collections: HashMap<String, Collection>,
}

impl LogStore {
    /// Opens (creating if needed) the database directory `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|cause| StorageError::Io {
            collection: String::new(),
            cause,
        })?;
        info!("opened database at {}", dir.display());

        Ok(Self {
            config: bincode::config::standard()
                .with_big_endian()
                .with_fixed_int_encoding(),
            dir,
            collections: HashMap::new(),
        })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{LOG_EXTENSION}"))
    }

    fn collection(&mut self, name: &str) -> Result<&mut Collection, StorageError> {
        validate_name(name)?;

        if !self.collections.contains_key(name) {
            let collection = self.replay(name)?;
            self.collections.insert(name.to_string(), collection);
        }

        self.collections
            .get_mut(name)
            .ok_or_else(|| StorageError::InvalidCollection(name.to_string()))
    }

    fn replay(&self, name: &str) -> Result<Collection, StorageError> {
        let io_error = |cause| StorageError::Io {
            collection: name.to_string(),
            cause,
        };
        let path = self.path(name);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_error)?;

        let mut reader = BufReader::new(file);
        let mut documents = Vec::new();
        let mut valid = 0;
        loop {
            let entry: Result<LogEntry, _> = decode_from_reader(&mut reader, self.config);
            match entry {
                Ok(LogEntry::Insert { id, body }) => {
                    let document =
                        serde_json::from_str(&body).map_err(|cause| StorageError::Corrupt {
                            collection: name.to_string(),
                            cause,
                        })?;
                    trace!("replayed {id} into {name}");
                    documents.push(document);
                    valid = reader.stream_position().map_err(io_error)?;
                }
                Err(_) => break,
            }
        }

        let mut file = reader.into_inner();
        let len = file.seek(SeekFrom::End(0)).map_err(io_error)?;
        if len > valid {
            warn!("dropping {} torn bytes from {}", len - valid, path.display());
            file.set_len(valid).map_err(io_error)?;
        }
        debug!("loaded {} documents from {name}", documents.len());

        Ok(Collection {
            documents,
            log: file,
            len: valid,
        })
    }
}

impl Collection {
    /// Appends an encoded entry. On failure the log is cut back to its last
    /// complete entry.
    fn append(&mut self, entry: &[u8]) -> io::Result<()> {
        let written = self.log.write_all(entry).and_then(|()| self.log.flush());
        if let Err(e) = written {
            if let Err(truncate) = self.log.set_len(self.len) {
                warn!("failed to roll back log after write error: {truncate}");
            }
            return Err(e);
        }
        self.len += entry.len() as u64;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), StorageError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidCollection(name.to_string()))
    }
}

impl DocumentStore for LogStore {
    fn insert(&mut self, collection: &str, document: Document) -> Result<String, StorageError> {
        let config = self.config;
        let (id, document) = assign_id(document);
        let target = self.collection(collection)?;

        if target
            .documents
            .iter()
            .any(|existing| existing.get(ID_FIELD) == document.get(ID_FIELD))
        {
            return Err(StorageError::DuplicateKey(id));
        }

        let body = serde_json::to_string(&document).map_err(|cause| StorageError::Corrupt {
            collection: collection.to_string(),
            cause,
        })?;
        let entry = LogEntry::Insert {
            id: id.clone(),
            body,
        };
        let entry = encode_to_vec(&entry, config).map_err(|cause| StorageError::Serialize {
            collection: collection.to_string(),
            cause,
        })?;

        if let Err(cause) = target.append(&entry) {
            // Cached documents may no longer match the log; replay on next use.
            self.collections.remove(collection);
            return Err(StorageError::Io {
                collection: collection.to_string(),
                cause,
            });
        }

        debug!("entry logged: {id} into {collection}");
        target.documents.push(document);
        Ok(id)
    }

    fn find(&mut self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StorageError> {
        validate_name(collection)?;
        if !self.collections.contains_key(collection) && !self.path(collection).exists() {
            return Ok(Vec::new());
        }

        let target = self.collection(collection)?;
        Ok(target
            .documents
            .iter()
            .filter(|document| filter.matches(document))
            .cloned()
            .collect())
    }
}
