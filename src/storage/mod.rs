//! Persistent guild and channel settings.
//!
//! Two tables back the bot's configuration:
//! - `guild`: the country selected with `setup`
//! - `channel`: channels registered with `notify`, with their run time

mod sqlite;

use thiserror::Error;

pub use sqlite::ConfigStore;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid run time: {0:?}")]
    InvalidRunAt(String),

    #[error("Database lock poisoned")]
    Poisoned,
}
