//! Error types for libSQL storage.

use thiserror::Error;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from libSQL.
    #[error("database error: {0}")]
    Database(#[from] libsql::Error),

    /// A row that does not decode into a selection.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Surface as a record store failure
    pub fn into_store(self) -> lever_core::Error {
        lever_core::Error::store(self)
    }

    /// Surface as an expiry index failure
    pub fn into_index(self) -> lever_core::Error {
        lever_core::Error::index(self)
    }
}
