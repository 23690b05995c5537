//! Transaction manager with savepoint nesting.
//!
//! [`TransactionManager::run`] opens a top-level transaction, hands the unit of
//! work an explicit `&mut` handle, and commits or rolls back depending on the
//! outcome. [`TransactionManager::nested`] runs a unit inside an already-open
//! transaction, isolated by a uniquely named savepoint:
//!
//! ```text
//! run ─┬─ BEGIN
//!      ├─ unit(tx) ─┬─ write A
//!      │            ├─ nested ─┬─ SAVEPOINT tx_sp_..
//!      │            │          ├─ write B, fails
//!      │            │          └─ ROLLBACK TO SAVEPOINT tx_sp_..
//!      │            └─ Ok
//!      └─ COMMIT            (only A persists)
//! ```
//!
//! Units are closures returning a boxed future tied to the borrow of the
//! handle. Anything else they need is moved in (typically an `Arc` clone):
//!
//! ```rust,ignore
//! let repo = Arc::clone(&self.repo);
//! let draws = self.transactions
//!     .run(move |tx| Box::pin(async move { repo.activate_draws(tx, now).await }))
//!     .await?;
//! ```

use futures::FutureExt;
use futures::future::BoxFuture;
use lottery_core::transaction::{TransactionError, TransactionHandle, TransactionSource};
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error, warn};

/// Deadline applied to top-level transactions unless overridden.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(50);

static SAVEPOINT_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Unique savepoint name: wall-clock nanos plus a process-wide sequence, so
/// sibling nested calls inside one transaction never collide.
fn savepoint_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = SAVEPOINT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("tx_sp_{nanos}_{seq}")
}

/// Runs units of work inside transactions opened from a [`TransactionSource`].
pub struct TransactionManager<S> {
    source: Arc<S>,
    timeout: Duration,
}

impl<S> Clone for TransactionManager<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            timeout: self.timeout,
        }
    }
}

impl<S: TransactionSource> TransactionManager<S> {
    /// Create a manager with the default 50 second deadline.
    #[must_use]
    pub const fn new(source: Arc<S>) -> Self {
        Self {
            source,
            timeout: DEFAULT_TRANSACTION_TIMEOUT,
        }
    }

    /// Override the deadline of top-level transactions.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Deadline of top-level transactions.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `unit` in a new top-level transaction.
    ///
    /// Commits when `unit` succeeds. Rolls back when it fails, exceeds the
    /// deadline, or panics; a panic is resumed after the rollback.
    ///
    /// # Errors
    ///
    /// - the error returned by `unit` (a failing rollback is only logged)
    /// - [`TransactionError::Begin`] / [`TransactionError::Commit`]
    /// - [`TransactionError::Timeout`] when the deadline expires
    pub async fn run<T, E, F>(&self, unit: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut S::Handle) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<TransactionError> + Display + Send,
    {
        let mut tx = self.source.begin().await?;

        let outcome = {
            let work = AssertUnwindSafe(unit(&mut tx)).catch_unwind();
            tokio::time::timeout(self.timeout, work).await
        };

        match outcome {
            Ok(Ok(Ok(value))) => {
                if let Err(e) = tx.commit().await {
                    metrics::counter!("lottery_transactions_total", "outcome" => "commit_failed")
                        .increment(1);
                    error!(error = %e, "Transaction commit failed");
                    return Err(e.into());
                }
                metrics::counter!("lottery_transactions_total", "outcome" => "committed").increment(1);
                Ok(value)
            }
            Ok(Ok(Err(err))) => {
                debug!(error = %err, "Unit of work failed, rolling back");
                Self::abort(tx, err.to_string()).await;
                Err(err)
            }
            Ok(Err(panic)) => {
                Self::abort(tx, "unit of work panicked".to_string()).await;
                std::panic::resume_unwind(panic)
            }
            Err(_elapsed) => {
                let err = TransactionError::Timeout(self.timeout);
                warn!(timeout = ?self.timeout, "Transaction deadline exceeded, rolling back");
                Self::abort(tx, err.to_string()).await;
                Err(err.into())
            }
        }
    }

    /// Run `unit` inside `tx`, isolated by a savepoint.
    ///
    /// On failure everything `unit` wrote is rolled back to the savepoint and
    /// the enclosing transaction stays usable. On success the savepoint is
    /// released.
    ///
    /// # Errors
    ///
    /// - the error returned by `unit`
    /// - [`TransactionError::Savepoint`] when a savepoint primitive fails; the
    ///   caller must then abort the enclosing transaction
    #[allow(clippy::unused_self)]
    pub async fn nested<T, E, F>(&self, tx: &mut S::Handle, unit: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut S::Handle) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<TransactionError> + Display + Send,
    {
        let name = savepoint_name();
        tx.create_savepoint(&name).await?;

        match unit(&mut *tx).await {
            Ok(value) => {
                tx.release_savepoint(&name).await?;
                Ok(value)
            }
            Err(err) => {
                debug!(savepoint = %name, error = %err, "Nested unit failed, rolling back to savepoint");
                metrics::counter!("lottery_transactions_total", "outcome" => "savepoint_rolled_back")
                    .increment(1);
                if let Err(savepoint_err) = tx.rollback_to_savepoint(&name).await {
                    error!(savepoint = %name, error = %savepoint_err, cause = %err, "Rollback to savepoint failed");
                    return Err(savepoint_err.into());
                }
                Err(err)
            }
        }
    }

    /// Nest inside `tx` when one is supplied, otherwise open a new transaction.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run) and [`nested`](Self::nested).
    pub async fn run_within<T, E, F>(&self, tx: Option<&mut S::Handle>, unit: F) -> Result<T, E>
    where
        F: for<'t> FnOnce(&'t mut S::Handle) -> BoxFuture<'t, Result<T, E>> + Send,
        T: Send,
        E: From<TransactionError> + Display + Send,
    {
        match tx {
            Some(tx) => self.nested(tx, unit).await,
            None => self.run(unit).await,
        }
    }

    async fn abort(tx: S::Handle, cause: String) {
        metrics::counter!("lottery_transactions_total", "outcome" => "rolled_back").increment(1);
        if let Err(e) = tx.rollback().await {
            error!(error = %e, cause = %cause, "Transaction rollback failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn savepoint_names_are_unique() {
        let names: HashSet<String> = (0..1000).map(|_| savepoint_name()).collect();
        assert_eq!(names.len(), 1000);
        assert!(names.iter().all(|n| n.starts_with("tx_sp_")));
    }
}
