use std::path::PathBuf;

use crate::command::{Arguments, CommandError};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6000;
pub const DEFAULT_DATABASE: &str = "docwire";

/// Connection and storage settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Directory holding database directories.
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: DEFAULT_DATABASE.to_string(),
            data_dir: PathBuf::from("."),
        }
    }
}

impl Settings {
    pub fn from_arguments(arguments: &Arguments) -> Result<Self, CommandError> {
        let defaults = Settings::default();
        Ok(Self {
            host: arguments
                .get("host")
                .map_or(defaults.host, str::to_string),
            port: arguments.port()?.unwrap_or(defaults.port),
            database: arguments
                .get("db")
                .map_or(defaults.database, str::to_string),
            data_dir: arguments.get("dir").map_or(defaults.data_dir, PathBuf::from),
        })
    }

    /// Directory of the configured database, `<data_dir>/<database>`.
    pub fn database_dir(&self) -> PathBuf {
        self.data_dir.join(&self.database)
    }
}
