//! Command-line arguments for the docwire binaries.
//!
//! Both binaries take their whole configuration as `key=value` tokens, e.g.
//!
//! ```text
//! docwire_cli host=127.0.0.1 port=6000 action=searchkey collection=info key=Symbol value=GOOG
//! ```
//!
//! Each token parses into a [`KeyValue`]; clap collects them and [`Arguments`]
//! keeps the ones the binary knows about. Unknown keys are reported and
//! ignored rather than rejected, so a shared command line can be pointed at
//! either binary.
//!
//! # Example
//! ```rust
//! use docwire::command::{Arguments, CLIENT_KEYS, KeyValue};
//!
//! let pairs: Vec<KeyValue> = ["action=test", "colour=blue"]
//!     .iter()
//!     .map(|token| token.parse().unwrap())
//!     .collect();
//! let arguments = Arguments::new(pairs, CLIENT_KEYS);
//!
//! assert_eq!(arguments.get("action"), Some("test"));
//! assert_eq!(arguments.unrecognized(), ["colour"]);
//! ```
//!
//! # See Also
//! - [`config`](crate::config): Defaults applied on top of the parsed arguments.
use std::{collections::HashMap, str::FromStr};

use log::warn;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{Request, RequestContent};

/// Keys understood by the client binary.
pub const CLIENT_KEYS: &[&str] = &[
    "host",
    "port",
    "db",
    "action",
    "key",
    "value",
    "collection",
    "data",
    "params",
];

/// Keys understood by the server binary.
pub const SERVER_KEYS: &[&str] = &["host", "port", "db", "dir"];

/// List of possible errors in command-line arguments.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("expected key=value, got '{0}'")]
    MissingSeparator(String),

    #[error("empty key in '{0}'")]
    EmptyKey(String),

    #[error("invalid port '{0}'")]
    InvalidPort(String),

    #[error("no action provided")]
    MissingAction,
}

/// One `key=value` token. Only the first `=` separates; the value may
/// contain more, as JSON filters often do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl FromStr for KeyValue {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .ok_or_else(|| CommandError::MissingSeparator(s.to_string()))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(CommandError::EmptyKey(s.to_string()));
        }

        Ok(KeyValue {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Recognised arguments of one invocation. A repeated key keeps its last value.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    values: HashMap<String, String>,
    unrecognized: Vec<String>,
}

impl Arguments {
    pub fn new(pairs: impl IntoIterator<Item = KeyValue>, known: &[&str]) -> Self {
        let mut arguments = Arguments::default();
        for KeyValue { key, value } in pairs {
            if known.contains(&key.as_str()) {
                arguments.values.insert(key, value);
            } else {
                warn!("ignoring unknown argument '{key}'");
                arguments.unrecognized.push(key);
            }
        }
        arguments
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn unrecognized(&self) -> &[String] {
        &self.unrecognized
    }

    /// Port argument, if given.
    pub fn port(&self) -> Result<Option<u16>, CommandError> {
        self.get("port")
            .map(|port| {
                port.parse()
                    .map_err(|_| CommandError::InvalidPort(port.to_string()))
            })
            .transpose()
    }

    /// Builds the request described by the arguments. Values are sent as
    /// text; `data` and `params` are expected to hold JSON.
    pub fn request(&self) -> Result<Request, CommandError> {
        let text = |key: &str| self.get(key).map(str::to_string);
        let action = text("action").ok_or(CommandError::MissingAction)?;

        let content = RequestContent {
            action,
            collection: text("collection"),
            key: text("key"),
            value: text("value").map(Value::String),
            data: text("data").map(Value::String),
            params: text("params").map(Value::String),
        };
        Ok(Request::new(content))
    }
}
