//! Error types for the storage subsystem.

use thiserror::Error;

/// Errors that can occur while reading or writing a physical store.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// A row with the same primary key already exists
    #[error("Duplicate key '{key}' in table '{table}'")]
    DuplicateKey { table: String, key: String },

    /// No row with the given primary key exists
    #[error("No row with key '{key}' in table '{table}'")]
    NotFound { table: String, key: String },

    /// The table name is not one of the registered record kinds
    #[error("Unknown table '{table}'")]
    UnknownTable { table: String },

    /// A record could not be converted to or from its row
    #[error("Malformed row in table '{table}': {message}")]
    Malformed { table: String, message: String },

    /// The live-store pointer is missing or holds an unexpected value
    #[error("Switch pointer error: {message}")]
    Pointer { message: String },

    /// The underlying database failed
    #[error("Connection error: {message}")]
    Connection { message: String },
}

impl StoreError {
    /// Returns true if this error concerns a single record and leaves the
    /// store usable for further writes.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            StoreError::DuplicateKey { .. } | StoreError::Malformed { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::DuplicateKey { .. })
    }

    pub(crate) fn malformed(table: &str, message: impl ToString) -> Self {
        StoreError::Malformed {
            table: table.to_string(),
            message: message.to_string(),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Connection {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Connection {
            message: err.to_string(),
        }
    }
}
