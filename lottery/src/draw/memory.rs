use super::model::{Draw, DrawResult, DrawStatus, NewDraw};
use super::repository::DrawRepository;
use crate::error::RepositoryError;
use crate::types::DrawId;
use chrono::{DateTime, Utc};
use lottery_core::transaction::{TransactionError, TransactionSource};
use lottery_testing::{MemoryStore, MemoryTransaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Draw table state held by [`InMemoryDrawRepository`].
#[derive(Debug, Clone, Default)]
pub struct DrawTables {
    draws: BTreeMap<DrawId, Draw>,
    results: BTreeMap<DrawId, DrawResult>,
    next_id: i64,
}

impl DrawTables {
    fn next_id(&mut self) -> DrawId {
        self.next_id += 1;
        DrawId::new(self.next_id)
    }

    fn transition(
        &mut self,
        from: DrawStatus,
        to: DrawStatus,
        due: impl Fn(&Draw) -> bool,
    ) -> Vec<Draw> {
        self.draws
            .values_mut()
            .filter(|draw| draw.status == from && due(draw))
            .map(|draw| {
                draw.status = to;
                draw.clone()
            })
            .collect()
    }
}

/// Draw repository over a [`MemoryStore`], for tests and local runs.
#[derive(Debug, Clone)]
pub struct InMemoryDrawRepository {
    store: MemoryStore<DrawTables>,
    write_faults: Arc<AtomicUsize>,
}

impl Default for InMemoryDrawRepository {
    fn default() -> Self {
        Self {
            store: MemoryStore::new(DrawTables::default()),
            write_faults: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl InMemoryDrawRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying store, for transaction statistics and commit faults.
    #[must_use]
    pub const fn store(&self) -> &MemoryStore<DrawTables> {
        &self.store
    }

    /// Store `draw` as committed state, keeping its id.
    pub fn insert(&self, draw: Draw) {
        self.store.seed(|tables| {
            tables.next_id = tables.next_id.max(draw.id.get());
            tables.draws.insert(draw.id, draw);
        });
    }

    /// Record the winning numbers of a draw as committed state.
    pub fn insert_result(&self, result: DrawResult) {
        self.store.seed(|tables| {
            tables.results.insert(result.draw_id, result);
        });
    }

    /// Committed draw with `id`.
    #[must_use]
    pub fn draw(&self, id: DrawId) -> Option<Draw> {
        self.store.snapshot().draws.get(&id).cloned()
    }

    /// Every committed draw, ordered by id.
    #[must_use]
    pub fn draws(&self) -> Vec<Draw> {
        self.store.snapshot().draws.into_values().collect()
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.write_faults.store(count, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), RepositoryError> {
        let armed = self
            .write_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if armed {
            Err(RepositoryError::Unavailable("injected write failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TransactionSource for InMemoryDrawRepository {
    type Handle = MemoryTransaction<DrawTables>;

    async fn begin(&self) -> Result<Self::Handle, TransactionError> {
        self.store.begin_now()
    }
}

impl DrawRepository for InMemoryDrawRepository {
    async fn create_draw(&self, tx: &mut Self::Handle, draw: &NewDraw) -> Result<Draw, RepositoryError> {
        self.check_write()?;
        let tables = tx.state_mut();
        let draw = Draw {
            id: tables.next_id(),
            lottery_type: draw.lottery_type,
            start_time: draw.start_time,
            end_time: draw.end_time,
            status: DrawStatus::Planned,
        };
        tables.draws.insert(draw.id, draw.clone());
        Ok(draw)
    }

    async fn get_draw(&self, tx: &mut Self::Handle, id: DrawId) -> Result<Option<Draw>, RepositoryError> {
        Ok(tx.state().draws.get(&id).cloned())
    }

    async fn draws_by_status(&self, tx: &mut Self::Handle, status: DrawStatus) -> Result<Vec<Draw>, RepositoryError> {
        Ok(tx
            .state()
            .draws
            .values()
            .filter(|draw| draw.status == status)
            .cloned()
            .collect())
    }

    async fn activate_draws(&self, tx: &mut Self::Handle, now: DateTime<Utc>) -> Result<Vec<Draw>, RepositoryError> {
        self.check_write()?;
        Ok(tx
            .state_mut()
            .transition(DrawStatus::Planned, DrawStatus::Active, |d| d.start_time <= now))
    }

    async fn complete_draws(&self, tx: &mut Self::Handle, now: DateTime<Utc>) -> Result<Vec<Draw>, RepositoryError> {
        self.check_write()?;
        Ok(tx
            .state_mut()
            .transition(DrawStatus::Active, DrawStatus::Completed, |d| d.end_time <= now))
    }

    async fn cancel_draw(&self, tx: &mut Self::Handle, id: DrawId) -> Result<Option<Draw>, RepositoryError> {
        self.check_write()?;
        let cancelled = tx.state_mut().draws.get_mut(&id).and_then(|draw| {
            draw.status
                .can_transition_to(DrawStatus::Cancelled)
                .then(|| {
                    draw.status = DrawStatus::Cancelled;
                    draw.clone()
                })
        });
        Ok(cancelled)
    }

    async fn get_draw_result(&self, tx: &mut Self::Handle, draw: DrawId) -> Result<Option<DrawResult>, RepositoryError> {
        Ok(tx.state().results.get(&draw).cloned())
    }
}
