//! Transactional in-memory state.
//!
//! A [`MemoryStore<S>`] holds committed state of any `Clone` type. Beginning a
//! transaction copies it into a [`MemoryTransaction`]; writes go to that
//! working copy, savepoints push snapshots of it, and commit swaps it back in.
//! Transactions are not isolated from each other: the last commit wins, which
//! is enough for single-writer tests.
//!
//! Faults can be armed on the store to exercise error paths:
//!
//! ```
//! use lottery_testing::MemoryStore;
//!
//! let store = MemoryStore::new(Vec::<u32>::new());
//! store.fail_next_commit();
//! assert_eq!(store.stats().committed, 0);
//! ```

use lottery_core::transaction::{
    SavepointOperation, TransactionError, TransactionHandle, TransactionSource,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Counters of transaction primitives executed against a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionStats {
    /// Transactions opened
    pub begun: usize,
    /// Successful commits
    pub committed: usize,
    /// Commits that failed (the working copy is discarded)
    pub commit_failures: usize,
    /// Explicit rollbacks
    pub rolled_back: usize,
    /// Savepoints created
    pub savepoints_created: usize,
    /// Savepoints released
    pub savepoints_released: usize,
    /// Rollbacks to a savepoint
    pub savepoint_rollbacks: usize,
}

#[derive(Debug, Default)]
struct Faults {
    begin: usize,
    /// Commits still allowed to succeed before one fails
    commit: Option<usize>,
    savepoint: Option<SavepointOperation>,
}

#[derive(Debug)]
struct Shared<S> {
    committed: S,
    stats: TransactionStats,
    faults: Faults,
}

/// Committed in-memory state that hands out transactions.
///
/// Clones share the same state.
#[derive(Debug)]
pub struct MemoryStore<S> {
    shared: Arc<Mutex<Shared<S>>>,
}

impl<S> Clone for MemoryStore<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Clone + Send + 'static> MemoryStore<S> {
    /// Create a store with `initial` as committed state.
    #[must_use]
    pub fn new(initial: S) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                committed: initial,
                stats: TransactionStats::default(),
                faults: Faults::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared<S>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the committed state.
    #[must_use]
    pub fn snapshot(&self) -> S {
        self.lock().committed.clone()
    }

    /// Mutate committed state directly, outside any transaction (test setup).
    pub fn seed(&self, f: impl FnOnce(&mut S)) {
        f(&mut self.lock().committed);
    }

    /// Counters of transaction primitives executed so far.
    #[must_use]
    pub fn stats(&self) -> TransactionStats {
        self.lock().stats
    }

    /// Make the next `begin` fail.
    pub fn fail_next_begin(&self) {
        self.lock().faults.begin += 1;
    }

    /// Make the next `commit` fail.
    pub fn fail_next_commit(&self) {
        self.fail_commit_after(0);
    }

    /// Let `successes` commits through, then make the following one fail.
    pub fn fail_commit_after(&self, successes: usize) {
        self.lock().faults.commit = Some(successes);
    }

    /// Make the next savepoint primitive of kind `operation` fail.
    pub fn fail_next_savepoint(&self, operation: SavepointOperation) {
        self.lock().faults.savepoint = Some(operation);
    }

    /// Open a transaction over a copy of the committed state.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::Begin`] when a begin fault is armed.
    pub fn begin_now(&self) -> Result<MemoryTransaction<S>, TransactionError> {
        let mut shared = self.lock();
        if shared.faults.begin > 0 {
            shared.faults.begin -= 1;
            return Err(TransactionError::Begin("injected begin failure".to_string()));
        }
        shared.stats.begun += 1;
        Ok(MemoryTransaction {
            store: self.clone(),
            working: shared.committed.clone(),
            savepoints: Vec::new(),
        })
    }
}

impl<S: Clone + Send + 'static> TransactionSource for MemoryStore<S> {
    type Handle = MemoryTransaction<S>;

    async fn begin(&self) -> Result<Self::Handle, TransactionError> {
        self.begin_now()
    }
}

/// Open transaction over a [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTransaction<S> {
    store: MemoryStore<S>,
    working: S,
    savepoints: Vec<(String, S)>,
}

impl<S: Clone + Send + 'static> MemoryTransaction<S> {
    /// Working copy as seen by this transaction.
    #[must_use]
    pub const fn state(&self) -> &S {
        &self.working
    }

    /// Mutable working copy.
    pub fn state_mut(&mut self) -> &mut S {
        &mut self.working
    }

    fn savepoint_fault(&self, name: &str, operation: SavepointOperation) -> Result<(), TransactionError> {
        let mut shared = self.store.lock();
        if shared.faults.savepoint == Some(operation) {
            shared.faults.savepoint = None;
            return Err(TransactionError::Savepoint {
                name: name.to_string(),
                operation,
                reason: "injected savepoint failure".to_string(),
            });
        }
        match operation {
            SavepointOperation::Create => shared.stats.savepoints_created += 1,
            SavepointOperation::Release => shared.stats.savepoints_released += 1,
            SavepointOperation::RollbackTo => shared.stats.savepoint_rollbacks += 1,
        }
        Ok(())
    }

    fn position(&self, name: &str, operation: SavepointOperation) -> Result<usize, TransactionError> {
        self.savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| TransactionError::Savepoint {
                name: name.to_string(),
                operation,
                reason: "savepoint does not exist".to_string(),
            })
    }
}

impl<S: Clone + Send + 'static> TransactionHandle for MemoryTransaction<S> {
    async fn create_savepoint(&mut self, name: &str) -> Result<(), TransactionError> {
        self.savepoint_fault(name, SavepointOperation::Create)?;
        self.savepoints.push((name.to_string(), self.working.clone()));
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> Result<(), TransactionError> {
        let position = self.position(name, SavepointOperation::Release)?;
        self.savepoint_fault(name, SavepointOperation::Release)?;
        // Releasing also forgets every savepoint created after it.
        self.savepoints.truncate(position);
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> Result<(), TransactionError> {
        let position = self.position(name, SavepointOperation::RollbackTo)?;
        self.savepoint_fault(name, SavepointOperation::RollbackTo)?;
        // The savepoint itself survives a rollback to it.
        self.savepoints.truncate(position + 1);
        self.working = self.savepoints[position].1.clone();
        Ok(())
    }

    async fn commit(self) -> Result<(), TransactionError> {
        let mut shared = self.store.lock();
        match shared.faults.commit {
            Some(0) => {
                shared.faults.commit = None;
                shared.stats.commit_failures += 1;
                return Err(TransactionError::Commit("injected commit failure".to_string()));
            }
            Some(remaining) => shared.faults.commit = Some(remaining - 1),
            None => {}
        }
        shared.committed = self.working;
        shared.stats.committed += 1;
        Ok(())
    }

    async fn rollback(self) -> Result<(), TransactionError> {
        self.store.lock().stats.rolled_back += 1;
        Ok(())
    }
}
