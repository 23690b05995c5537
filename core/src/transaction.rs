//! Explicit database transaction objects.
//!
//! A unit of work never finds its transaction in ambient state. It receives a
//! `&mut` handle from the transaction manager and passes it to every repository
//! call that must participate. Because the handle is borrowed mutably, it cannot
//! be shared across tasks, and nested work on the same handle is sequential.
//!
//! Two traits form the seam:
//!
//! - [`TransactionSource`]: opens a new top-level transaction
//! - [`TransactionHandle`]: an open transaction with savepoint primitives
//!
//! Repositories extend [`TransactionSource`] so a single value can both start
//! transactions and run queries inside them.

use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Savepoint primitive that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavepointOperation {
    /// `SAVEPOINT name`
    Create,
    /// `RELEASE SAVEPOINT name`
    Release,
    /// `ROLLBACK TO SAVEPOINT name`
    RollbackTo,
}

impl fmt::Display for SavepointOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            Self::Create => "create",
            Self::Release => "release",
            Self::RollbackTo => "rollback to",
        };
        f.write_str(op)
    }
}

/// Errors raised by transaction primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    /// Could not open a transaction (pool exhausted, connection lost)
    #[error("Failed to begin transaction: {0}")]
    Begin(String),

    /// Commit was rejected; the caller must not assume the work persisted
    #[error("Failed to commit transaction: {0}")]
    Commit(String),

    /// Rollback of the whole transaction failed
    #[error("Failed to roll back transaction: {0}")]
    Rollback(String),

    /// A savepoint primitive failed; the enclosing transaction must be aborted
    #[error("Failed to {operation} savepoint '{name}': {reason}")]
    Savepoint {
        /// Savepoint name
        name: String,
        /// Primitive that failed
        operation: SavepointOperation,
        /// Underlying reason
        reason: String,
    },

    /// The unit of work exceeded the transaction deadline
    #[error("Transaction exceeded its deadline of {0:?}")]
    Timeout(Duration),
}

/// An open database transaction.
///
/// Consuming `commit`/`rollback` end the transaction. Dropping a handle without
/// either must roll back.
pub trait TransactionHandle: Send {
    /// Mark a savepoint inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Savepoint`] on failure.
    fn create_savepoint(
        &mut self,
        name: &str,
    ) -> impl Future<Output = Result<(), TransactionError>> + Send;

    /// Forget a savepoint, keeping everything written since it was created.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Savepoint`] on failure.
    fn release_savepoint(
        &mut self,
        name: &str,
    ) -> impl Future<Output = Result<(), TransactionError>> + Send;

    /// Discard everything written since the savepoint was created.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Savepoint`] on failure.
    fn rollback_to_savepoint(
        &mut self,
        name: &str,
    ) -> impl Future<Output = Result<(), TransactionError>> + Send;

    /// Make the transaction durable.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Commit`] on failure.
    fn commit(self) -> impl Future<Output = Result<(), TransactionError>> + Send
    where
        Self: Sized;

    /// Abort the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Rollback`] on failure.
    fn rollback(self) -> impl Future<Output = Result<(), TransactionError>> + Send
    where
        Self: Sized;
}

/// Something that can open top-level transactions.
pub trait TransactionSource: Send + Sync {
    /// Transaction type produced by this source.
    type Handle: TransactionHandle;

    /// Open a new top-level transaction.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Begin`] if no transaction could be opened.
    fn begin(&self) -> impl Future<Output = Result<Self::Handle, TransactionError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn savepoint_error_names_operation() {
        let err = TransactionError::Savepoint {
            name: "tx_sp_1".into(),
            operation: SavepointOperation::RollbackTo,
            reason: "connection reset".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to rollback to savepoint 'tx_sp_1': connection reset"
        );
    }
}
