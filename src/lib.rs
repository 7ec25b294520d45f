pub mod command;
pub mod config;
pub mod protocol;
pub mod query;
pub mod storage;

pub use command::{Arguments, CommandError, KeyValue};
pub use config::Settings;
pub use storage::{DocumentStore, LogStore, MemoryStore, StorageError};
