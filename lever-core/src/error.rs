//! Error types for lever-core

use thiserror::Error;

use crate::types::SelectionId;

/// Boxed cause carried by storage and index failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for arm lifecycle operations
#[derive(Debug, Error)]
pub enum Error {
    /// Input rejected before reaching any store
    #[error("validation error: {0}")]
    Validation(String),

    /// No selection with this id
    #[error("selection not found: {0}")]
    NotFound(SelectionId),

    /// A selection with this id already exists
    #[error("selection already exists: {0}")]
    Conflict(SelectionId),

    /// The selection was resolved before this call
    #[error("selection already resolved: {0}")]
    AlreadyResolved(SelectionId),

    /// Reported arm differs from the arm served at selection time
    #[error("arm mismatch for {id}: expected {expected}, got {actual}")]
    Mismatch {
        id: SelectionId,
        expected: usize,
        actual: usize,
    },

    /// Arm or reward outside its declared range
    #[error("out of range: {0}")]
    Range(String),

    /// Record store I/O failed
    #[error("record store error: {0}")]
    Store(#[source] BoxError),

    /// Expiry index I/O failed
    #[error("expiry index error: {0}")]
    Index(#[source] BoxError),
}

impl Error {
    /// Wrap any store failure, keeping it as the source
    pub fn store(err: impl Into<BoxError>) -> Self {
        Self::Store(err.into())
    }

    /// Wrap any index failure, keeping it as the source
    pub fn index(err: impl Into<BoxError>) -> Self {
        Self::Index(err.into())
    }

    /// True for errors caused by the caller's input rather than I/O
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store(_) | Self::Index(_))
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::AlreadyResolved(_) => "ALREADY_RESOLVED",
            Self::Mismatch { .. } => "ARM_MISMATCH",
            Self::Range(_) => "OUT_OF_RANGE",
            Self::Store(_) => "STORE_ERROR",
            Self::Index(_) => "INDEX_ERROR",
        }
    }
}

/// Result type alias for lever operations
pub type Result<T> = std::result::Result<T, Error>;

/// Check that a reward lies in `[0, 1]`; NaN is rejected.
pub fn check_reward(reward: f64) -> Result<()> {
    if (0.0..=1.0).contains(&reward) {
        Ok(())
    } else {
        Err(Error::Range(format!("reward {reward} is outside [0, 1]")))
    }
}
