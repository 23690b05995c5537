use super::model::{NewTicket, Ticket, TicketStatus, TicketWithDraw};
use super::numbers::{self, NumbersError};
use super::repository::TicketRepository;
use crate::draw::DrawStatus;
use crate::error::RepositoryError;
use crate::types::{DrawId, TicketId, UserId};
use lottery_core::environment::Clock;
use lottery_core::transaction::TransactionError;
use lottery_runtime::TransactionManager;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from ticket operations.
#[derive(Error, Debug)]
pub enum TicketError {
    /// The draw does not exist or is not on sale
    #[error("Draw {0} is not active")]
    DrawNotActive(DrawId),

    /// The draw does not exist
    #[error("Draw {0} not found")]
    DrawNotFound(DrawId),

    /// The picked numbers do not fit the draw
    #[error("Invalid ticket numbers: {0}")]
    InvalidNumbers(#[from] NumbersError),

    /// No ticket with this id
    #[error("Ticket {0} not found")]
    NotFound(TicketId),

    /// The ticket already has an owner
    #[error("Ticket {0} is already booked")]
    TicketUnavailable(TicketId),

    /// An empty winner list was supplied
    #[error("No tickets selected")]
    NoTicketsSelected,

    /// Storage failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A transaction primitive failed
    #[error(transparent)]
    Transaction(#[from] TransactionError),
}

/// Ticket service.
pub struct TicketService<R> {
    repo: Arc<R>,
    transactions: TransactionManager<R>,
    clock: Arc<dyn Clock>,
}

impl<R: TicketRepository> TicketService<R> {
    /// Create the service.
    #[must_use]
    pub fn new(repo: Arc<R>, clock: Arc<dyn Clock>) -> Self {
        Self {
            transactions: TransactionManager::new(Arc::clone(&repo)),
            repo,
            clock,
        }
    }

    /// Override the transaction deadline.
    #[must_use]
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transactions = self.transactions.with_timeout(timeout);
        self
    }

    /// Enter the `picked` numbers for `user` in an active draw.
    ///
    /// Numbers are validated against the draw's configuration and stored with
    /// two digits. Nothing is written when validation fails.
    ///
    /// # Errors
    ///
    /// [`TicketError::DrawNotActive`], [`TicketError::InvalidNumbers`], storage
    /// errors.
    pub async fn create_ticket(&self, user: UserId, draw: DrawId, picked: Vec<String>) -> Result<Ticket, TicketError> {
        let repo = Arc::clone(&self.repo);
        let created_at = self.clock.now();

        let ticket = self
            .transactions
            .run(move |tx| {
                Box::pin(async move {
                    let info = repo
                        .draw_info(tx, draw)
                        .await?
                        .filter(|info| info.status == DrawStatus::Active)
                        .ok_or(TicketError::DrawNotActive(draw))?;
                    let numbers = numbers::normalize(info.lottery_type, &picked)?;

                    let ticket = NewTicket {
                        user_id: Some(user),
                        draw_id: draw,
                        numbers,
                        created_at,
                    };
                    Ok::<_, TicketError>(repo.insert_ticket(tx, &ticket).await?)
                })
            })
            .await?;

        info!(ticket_id = %ticket.id, draw_id = %draw, user_id = %user, "Ticket created");
        Ok(ticket)
    }

    /// Load a ticket.
    ///
    /// # Errors
    ///
    /// [`TicketError::NotFound`], storage errors.
    pub async fn get_ticket(&self, id: TicketId) -> Result<Ticket, TicketError> {
        let repo = Arc::clone(&self.repo);
        self.transactions
            .run(move |tx| Box::pin(async move { Ok::<_, TicketError>(repo.get_ticket(tx, id).await?) }))
            .await?
            .ok_or(TicketError::NotFound(id))
    }

    /// Tickets owned by `user`, newest first, each with its draw.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn user_tickets(&self, user: UserId) -> Result<Vec<TicketWithDraw>, TicketError> {
        let repo = Arc::clone(&self.repo);
        self.transactions
            .run(move |tx| Box::pin(async move { Ok::<_, TicketError>(repo.tickets_by_user(tx, user).await?) }))
            .await
    }

    /// Give an unbooked ticket to `user`.
    ///
    /// # Errors
    ///
    /// [`TicketError::NotFound`], [`TicketError::TicketUnavailable`] when the
    /// ticket already has an owner, storage errors.
    pub async fn book_ticket(&self, user: UserId, id: TicketId) -> Result<Ticket, TicketError> {
        let repo = Arc::clone(&self.repo);
        let ticket = self
            .transactions
            .run(move |tx| {
                Box::pin(async move {
                    if repo.get_ticket(tx, id).await?.is_none() {
                        return Err(TicketError::NotFound(id));
                    }
                    repo.book_ticket(tx, id, user)
                        .await?
                        .ok_or(TicketError::TicketUnavailable(id))
                })
            })
            .await?;

        info!(ticket_id = %id, user_id = %user, "Ticket booked");
        Ok(ticket)
    }

    /// Return a ticket to the available pool: no owner, status PENDING.
    ///
    /// # Errors
    ///
    /// [`TicketError::NotFound`], storage errors.
    pub async fn release_booking(&self, id: TicketId) -> Result<(), TicketError> {
        let repo = Arc::clone(&self.repo);
        let released = self
            .transactions
            .run(move |tx| Box::pin(async move { Ok::<_, TicketError>(repo.clear_booking(tx, id).await?) }))
            .await?;

        if !released {
            return Err(TicketError::NotFound(id));
        }
        metrics::counter!("lottery_bookings_released_total").increment(1);
        info!(ticket_id = %id, "Booking released");
        Ok(())
    }

    /// Create `count` system-owned tickets with random numbers for `draw`.
    ///
    /// Each ticket is inserted in its own transaction. The first failure stops
    /// the batch; tickets already inserted stay.
    ///
    /// # Errors
    ///
    /// [`TicketError::DrawNotFound`], storage errors.
    pub async fn generate_tickets(&self, draw: DrawId, count: usize) -> Result<Vec<Ticket>, TicketError> {
        let repo = Arc::clone(&self.repo);
        let info = self
            .transactions
            .run(move |tx| Box::pin(async move { Ok::<_, TicketError>(repo.draw_info(tx, draw).await?) }))
            .await?
            .ok_or(TicketError::DrawNotFound(draw))?;

        let created_at = self.clock.now();
        let mut tickets = Vec::with_capacity(count);
        for index in 0..count {
            let repo = Arc::clone(&self.repo);
            let ticket = NewTicket {
                user_id: None,
                draw_id: draw,
                numbers: numbers::generate(info.lottery_type),
                created_at,
            };
            let inserted = self
                .transactions
                .run(move |tx| Box::pin(async move { Ok::<_, TicketError>(repo.insert_ticket(tx, &ticket).await?) }))
                .await
                .inspect_err(|e| {
                    tracing::error!(draw_id = %draw, index, generated = tickets.len(), error = %e, "Ticket generation aborted");
                })?;
            metrics::counter!("lottery_tickets_generated_total").increment(1);
            debug!(ticket_id = %inserted.id, draw_id = %draw, "Ticket generated");
            tickets.push(inserted);
        }

        info!(draw_id = %draw, count = tickets.len(), "Ticket pool generated");
        Ok(tickets)
    }

    /// Unbooked tickets of active draws.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn available_tickets(&self) -> Result<Vec<Ticket>, TicketError> {
        let repo = Arc::clone(&self.repo);
        self.transactions
            .run(move |tx| Box::pin(async move { Ok::<_, TicketError>(repo.available_tickets(tx).await?) }))
            .await
    }

    /// Mark `ids` as winning tickets.
    ///
    /// # Errors
    ///
    /// [`TicketError::NoTicketsSelected`] for an empty list, storage errors.
    pub async fn set_winning_tickets(&self, ids: Vec<TicketId>) -> Result<Vec<Ticket>, TicketError> {
        if ids.is_empty() {
            return Err(TicketError::NoTicketsSelected);
        }

        let repo = Arc::clone(&self.repo);
        let winners = self
            .transactions
            .run(move |tx| {
                Box::pin(async move { Ok::<_, TicketError>(repo.set_statuses(tx, &ids, TicketStatus::Win).await?) })
            })
            .await?;

        info!(count = winners.len(), "Winning tickets marked");
        Ok(winners)
    }

    /// Result state of a ticket.
    ///
    /// # Errors
    ///
    /// [`TicketError::NotFound`], storage errors.
    pub async fn check_result(&self, id: TicketId) -> Result<TicketStatus, TicketError> {
        Ok(self.get_ticket(id).await?.status)
    }
}
