use super::model::{DrawInfo, NewTicket, Ticket, TicketStatus, TicketWithDraw};
use super::repository::TicketRepository;
use crate::draw::{Draw, DrawStatus};
use crate::error::RepositoryError;
use crate::types::{DrawId, TicketId, UserId};
use lottery_core::transaction::{TransactionError, TransactionSource};
use lottery_testing::{MemoryStore, MemoryTransaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ticket table state held by [`InMemoryTicketRepository`], with a copy of
/// the draws the tickets refer to.
#[derive(Debug, Clone, Default)]
pub struct TicketTables {
    draws: BTreeMap<DrawId, Draw>,
    tickets: BTreeMap<TicketId, Ticket>,
    next_id: i64,
}

/// Ticket repository over a [`MemoryStore`], for tests and local runs.
#[derive(Debug, Clone)]
pub struct InMemoryTicketRepository {
    store: MemoryStore<TicketTables>,
    insert_faults: Arc<AtomicUsize>,
}

impl Default for InMemoryTicketRepository {
    fn default() -> Self {
        Self {
            store: MemoryStore::new(TicketTables::default()),
            insert_faults: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl InMemoryTicketRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying store, for transaction statistics and commit faults.
    #[must_use]
    pub const fn store(&self) -> &MemoryStore<TicketTables> {
        &self.store
    }

    /// Record a draw the tickets can refer to.
    pub fn insert_draw(&self, draw: Draw) {
        self.store.seed(|tables| {
            tables.draws.insert(draw.id, draw);
        });
    }

    /// Store `ticket` as committed state, keeping its id.
    pub fn insert(&self, ticket: Ticket) {
        self.store.seed(|tables| {
            tables.next_id = tables.next_id.max(ticket.id.get());
            tables.tickets.insert(ticket.id, ticket);
        });
    }

    /// Committed ticket with `id`.
    #[must_use]
    pub fn ticket(&self, id: TicketId) -> Option<Ticket> {
        self.store.snapshot().tickets.get(&id).cloned()
    }

    /// Every committed ticket, ordered by id.
    #[must_use]
    pub fn tickets(&self) -> Vec<Ticket> {
        self.store.snapshot().tickets.into_values().collect()
    }

    /// Let `successes` inserts through, then fail the next one.
    pub fn fail_insert_after(&self, successes: usize) {
        self.insert_faults.store(successes + 1, Ordering::SeqCst);
    }

    fn check_insert(&self) -> Result<(), RepositoryError> {
        // 0 = disarmed, 1 = fail now, n = fail after n - 1 more inserts
        let previous = self
            .insert_faults
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if previous == Ok(1) {
            Err(RepositoryError::Unavailable("injected insert failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl TransactionSource for InMemoryTicketRepository {
    type Handle = MemoryTransaction<TicketTables>;

    async fn begin(&self) -> Result<Self::Handle, TransactionError> {
        self.store.begin_now()
    }
}

impl TicketRepository for InMemoryTicketRepository {
    async fn draw_info(&self, tx: &mut Self::Handle, draw: DrawId) -> Result<Option<DrawInfo>, RepositoryError> {
        Ok(tx.state().draws.get(&draw).map(DrawInfo::from))
    }

    async fn insert_ticket(&self, tx: &mut Self::Handle, ticket: &NewTicket) -> Result<Ticket, RepositoryError> {
        self.check_insert()?;
        let tables = tx.state_mut();
        tables.next_id += 1;
        let ticket = Ticket {
            id: TicketId::new(tables.next_id),
            user_id: ticket.user_id,
            draw_id: ticket.draw_id,
            numbers: ticket.numbers.clone(),
            status: TicketStatus::Pending,
            created_at: ticket.created_at,
        };
        tables.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get_ticket(&self, tx: &mut Self::Handle, id: TicketId) -> Result<Option<Ticket>, RepositoryError> {
        Ok(tx.state().tickets.get(&id).cloned())
    }

    async fn tickets_by_user(
        &self,
        tx: &mut Self::Handle,
        user: UserId,
    ) -> Result<Vec<TicketWithDraw>, RepositoryError> {
        let tables = tx.state();
        let mut owned: Vec<TicketWithDraw> = tables
            .tickets
            .values()
            .filter(|t| t.user_id == Some(user))
            .filter_map(|t| {
                tables.draws.get(&t.draw_id).map(|draw| TicketWithDraw {
                    ticket: t.clone(),
                    draw: draw.clone(),
                })
            })
            .collect();
        owned.sort_by(|a, b| {
            b.ticket
                .created_at
                .cmp(&a.ticket.created_at)
                .then(b.ticket.id.cmp(&a.ticket.id))
        });
        Ok(owned)
    }

    async fn book_ticket(
        &self,
        tx: &mut Self::Handle,
        id: TicketId,
        user: UserId,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let booked = tx.state_mut().tickets.get_mut(&id).and_then(|ticket| {
            ticket.is_available().then(|| {
                ticket.user_id = Some(user);
                ticket.clone()
            })
        });
        Ok(booked)
    }

    async fn clear_booking(&self, tx: &mut Self::Handle, id: TicketId) -> Result<bool, RepositoryError> {
        let Some(ticket) = tx.state_mut().tickets.get_mut(&id) else {
            return Ok(false);
        };
        ticket.user_id = None;
        ticket.status = TicketStatus::Pending;
        Ok(true)
    }

    async fn available_tickets(&self, tx: &mut Self::Handle) -> Result<Vec<Ticket>, RepositoryError> {
        let tables = tx.state();
        Ok(tables
            .tickets
            .values()
            .filter(|t| {
                t.is_available()
                    && tables
                        .draws
                        .get(&t.draw_id)
                        .is_some_and(|d| d.status == DrawStatus::Active)
            })
            .cloned()
            .collect())
    }

    async fn set_statuses(
        &self,
        tx: &mut Self::Handle,
        ids: &[TicketId],
        status: TicketStatus,
    ) -> Result<Vec<Ticket>, RepositoryError> {
        let tickets = &mut tx.state_mut().tickets;
        let mut updated: Vec<Ticket> = ids
            .iter()
            .filter_map(|id| {
                tickets.get_mut(id).map(|ticket| {
                    ticket.status = status;
                    ticket.clone()
                })
            })
            .collect();
        updated.sort_by_key(|t| t.id);
        updated.dedup_by_key(|t| t.id);
        Ok(updated)
    }
}
