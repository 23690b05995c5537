//! Storage errors shared by every repository.

use thiserror::Error;

/// Errors raised by repository implementations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The database rejected or failed a query
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be turned into a domain value
    #[error("Corrupt row: {0}")]
    Decode(String),

    /// The store is unreachable or refused the write
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}
