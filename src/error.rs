use rusqlite::Error as RusqliteError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrateError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error), // Converts io::Error into MigrateError automatically

    #[error("Database error: {0}")]
    DatabaseError(#[from] RusqliteError), // Converts rusqlite::Error automatically

    #[error("Configuration error: {0}")]
    ConfigError(#[from] Box<figment::Error>),

    #[error("Logger error: {0}")]
    LoggerError(#[from] flexi_logger::FlexiLoggerError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Migration '{unit}' failed: {source}")]
    Migration {
        unit: &'static str,
        #[source]
        source: Box<MigrateError>,
    },

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}

impl MigrateError {
    pub fn in_unit(unit: &'static str, source: MigrateError) -> Self {
        MigrateError::Migration {
            unit,
            source: Box::new(source),
        }
    }
}
