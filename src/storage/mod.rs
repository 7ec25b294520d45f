//! Document storage.
//!
//! The query backend talks to storage through the [`DocumentStore`] trait.
//! Two implementations are provided:
//!
//! - [`MemoryStore`]: collections held in memory, used by tests and throwaway servers.
//! - [`LogStore`]: a database directory holding one append-only log per collection.
//!
//! Documents are JSON objects. Every stored document carries an `_id`, generated
//! as an [`ObjectId`] when the caller does not supply one.
pub mod document;
pub mod filter;
pub mod log;
pub mod memory;

use std::io;

use thiserror::Error;

pub use document::{Document, ObjectId};
pub use filter::{Filter, FilterError};
pub use log::LogStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("duplicate _id '{0}'")]
    DuplicateKey(String),

    #[error("invalid collection name '{0}'")]
    InvalidCollection(String),

    #[error("[log][{collection}] io error: {cause}")]
    Io { collection: String, cause: io::Error },

    #[error("[log][{collection}] failed to encode entry: {cause}")]
    Serialize {
        collection: String,
        cause: bincode::error::EncodeError,
    },

    #[error("[log][{collection}] corrupt document: {cause}")]
    Corrupt {
        collection: String,
        cause: serde_json::Error,
    },
}

/// Collection-oriented document storage.
pub trait DocumentStore {
    /// Stores `document` in `collection`, creating the collection on first use.
    /// Returns the document's `_id` rendered as a string.
    fn insert(&mut self, collection: &str, document: Document) -> Result<String, StorageError>;

    /// Returns every document in `collection` matching `filter`, in insertion order.
    fn find(&mut self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StorageError>;
}
