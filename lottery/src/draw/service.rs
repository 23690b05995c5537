//! Draw state machine.
//!
//! ```text
//! Scheduler ──► activate_draws ─┬─ tx: PLANNED → ACTIVE (start_time <= now)
//!                               ├─ commit
//!                               └─ publish draw_activated, one per draw, in id order
//! ```
//!
//! Sweeps publish after commit: a publish failure aborts the sweep, but the
//! draws it already moved stay moved and will not be selected again. The
//! missed notification has to be reconciled out of band.
//!
//! Cancellation publishes before commit instead, so a `draw_cancelled` event
//! is never emitted for a cancellation that was rolled back.

use super::event::{DrawEvent, DrawEventKind};
use super::model::{Draw, DrawResult, DrawStatus, NewDraw};
use super::repository::DrawRepository;
use crate::error::RepositoryError;
use crate::types::{DrawId, LotteryConfig};
use chrono::{DateTime, Utc};
use lottery_core::environment::Clock;
use lottery_core::event_bus::{EventBus, EventBusError, publish_event};
use lottery_core::transaction::TransactionError;
use lottery_runtime::TransactionManager;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors from draw operations.
#[derive(Error, Debug)]
pub enum DrawError {
    /// No draw with this id
    #[error("Draw {0} not found")]
    NotFound(DrawId),

    /// The draw's current state does not allow the transition
    #[error("Draw {id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Draw
        id: DrawId,
        /// Current state
        from: DrawStatus,
        /// Requested state
        to: DrawStatus,
    },

    /// The draw would close before it opens
    #[error("Draw must start before it ends (start {start}, end {end})")]
    InvalidSchedule {
        /// Requested start
        start: DateTime<Utc>,
        /// Requested end
        end: DateTime<Utc>,
    },

    /// Storage failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A transaction primitive failed
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// A transition could not be announced
    #[error(transparent)]
    Publish(#[from] EventBusError),
}

/// Draw lifecycle service.
pub struct DrawLifecycle<R> {
    repo: Arc<R>,
    transactions: TransactionManager<R>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    channel: String,
}

impl<R: DrawRepository> DrawLifecycle<R> {
    /// Create the service. Events go to `channel`.
    #[must_use]
    pub fn new(
        repo: Arc<R>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            transactions: TransactionManager::new(Arc::clone(&repo)),
            repo,
            events,
            clock,
            channel: channel.into(),
        }
    }

    /// Override the transaction deadline.
    #[must_use]
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transactions = self.transactions.with_timeout(timeout);
        self
    }

    /// Schedule a new draw in the PLANNED state.
    ///
    /// # Errors
    ///
    /// [`DrawError::InvalidSchedule`] unless `start < end`; storage errors.
    pub async fn create_draw(
        &self,
        lottery_type: LotteryConfig,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Draw, DrawError> {
        if start_time >= end_time {
            return Err(DrawError::InvalidSchedule {
                start: start_time,
                end: end_time,
            });
        }

        let repo = Arc::clone(&self.repo);
        let draft = NewDraw {
            lottery_type,
            start_time,
            end_time,
        };
        let draw = self
            .transactions
            .run(move |tx| Box::pin(async move { Ok::<_, DrawError>(repo.create_draw(tx, &draft).await?) }))
            .await?;

        info!(draw_id = %draw.id, lottery_type = %draw.lottery_type, "Draw planned");
        Ok(draw)
    }

    /// Load a draw.
    ///
    /// # Errors
    ///
    /// [`DrawError::NotFound`]; storage errors.
    pub async fn get_draw(&self, id: DrawId) -> Result<Draw, DrawError> {
        let repo = Arc::clone(&self.repo);
        self.transactions
            .run(move |tx| Box::pin(async move { Ok::<_, DrawError>(repo.get_draw(tx, id).await?) }))
            .await?
            .ok_or(DrawError::NotFound(id))
    }

    /// Winning numbers of a draw.
    ///
    /// # Errors
    ///
    /// [`DrawError::NotFound`] when no result has been recorded for `id`;
    /// storage errors.
    pub async fn get_draw_result(&self, id: DrawId) -> Result<DrawResult, DrawError> {
        let repo = Arc::clone(&self.repo);
        self.transactions
            .run(move |tx| Box::pin(async move { Ok::<_, DrawError>(repo.get_draw_result(tx, id).await?) }))
            .await?
            .ok_or(DrawError::NotFound(id))
    }

    /// Draws currently on sale.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn active_draws(&self) -> Result<Vec<Draw>, DrawError> {
        self.draws_by_status(DrawStatus::Active).await
    }

    /// Draws that have closed.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn completed_draws(&self) -> Result<Vec<Draw>, DrawError> {
        self.draws_by_status(DrawStatus::Completed).await
    }

    async fn draws_by_status(&self, status: DrawStatus) -> Result<Vec<Draw>, DrawError> {
        let repo = Arc::clone(&self.repo);
        self.transactions
            .run(move |tx| Box::pin(async move { Ok::<_, DrawError>(repo.draws_by_status(tx, status).await?) }))
            .await
    }

    /// Open every planned draw whose start time has passed.
    ///
    /// Returns the activated draws in the order their events were published.
    ///
    /// # Errors
    ///
    /// Storage errors (nothing changed) or the first publish failure (the
    /// transition is already committed).
    pub async fn activate_draws(&self) -> Result<Vec<Draw>, DrawError> {
        let now = self.clock.now();
        let repo = Arc::clone(&self.repo);
        let draws = self
            .transactions
            .run(move |tx| Box::pin(async move { Ok::<_, DrawError>(repo.activate_draws(tx, now).await?) }))
            .await?;

        self.announce(DrawEventKind::DrawActivated, &draws).await?;
        Ok(draws)
    }

    /// Close every active draw whose end time has passed.
    ///
    /// # Errors
    ///
    /// Same as [`activate_draws`](Self::activate_draws).
    pub async fn complete_draws(&self) -> Result<Vec<Draw>, DrawError> {
        let now = self.clock.now();
        let repo = Arc::clone(&self.repo);
        let draws = self
            .transactions
            .run(move |tx| Box::pin(async move { Ok::<_, DrawError>(repo.complete_draws(tx, now).await?) }))
            .await?;

        self.announce(DrawEventKind::DrawCompleted, &draws).await?;
        Ok(draws)
    }

    /// Cancel a planned or active draw.
    ///
    /// The `draw_cancelled` event is published inside the transaction; if the
    /// publish fails the cancellation is rolled back.
    ///
    /// # Errors
    ///
    /// [`DrawError::NotFound`], [`DrawError::InvalidTransition`] for terminal
    /// draws, storage and publish errors.
    pub async fn cancel_draw(&self, id: DrawId) -> Result<Draw, DrawError> {
        let repo = Arc::clone(&self.repo);
        let events = Arc::clone(&self.events);
        let channel = self.channel.clone();

        let draw = self
            .transactions
            .run(move |tx| {
                Box::pin(async move {
                    let current = repo.get_draw(tx, id).await?.ok_or(DrawError::NotFound(id))?;
                    let cancelled = repo.cancel_draw(tx, id).await?.ok_or(DrawError::InvalidTransition {
                        id,
                        from: current.status,
                        to: DrawStatus::Cancelled,
                    })?;

                    let event = DrawEvent::new(DrawEventKind::DrawCancelled, cancelled.clone());
                    publish_event(events.as_ref(), &channel, &event).await?;
                    Ok::<_, DrawError>(cancelled)
                })
            })
            .await?;

        metrics::counter!("lottery_draw_transitions_total", "status" => DrawStatus::Cancelled.as_str())
            .increment(1);
        info!(draw_id = %id, "Draw cancelled");
        Ok(draw)
    }

    async fn announce(&self, kind: DrawEventKind, draws: &[Draw]) -> Result<(), DrawError> {
        for draw in draws {
            metrics::counter!("lottery_draw_transitions_total", "status" => draw.status.as_str()).increment(1);
            let event = DrawEvent::new(kind, draw.clone());
            if let Err(e) = publish_event(self.events.as_ref(), &self.channel, &event).await {
                warn!(
                    draw_id = %draw.id,
                    event = kind.as_str(),
                    error = %e,
                    "Transition committed but not announced"
                );
                return Err(e.into());
            }
            info!(draw_id = %draw.id, status = %draw.status, event = kind.as_str(), "Draw transitioned");
        }
        Ok(())
    }
}
