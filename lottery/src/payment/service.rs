//! Invoices and the payment saga.
//!
//! ```text
//! pay ─► validate card ─► read amount ─► gateway.charge ─► tx: invoice PENDING → PAID, payment PAID ─► commit
//!                                              │ any failure, commit included
//!                                              ▼
//!                                  rollback ─► gateway.refund (once) ─► tx: payment REJECTED
//! ```
//!
//! The gateway is outside the database transaction, so a failed local commit
//! is compensated by refunding the charge. A failed refund is logged and left
//! for manual reconciliation.

use super::card::{Card, CardError};
use super::event::InvoiceEvent;
use super::gateway::{GatewayError, GatewayTransactionId, PaymentGateway};
use super::model::{Invoice, InvoiceStatus, NewInvoice, Payment, PaymentStatus, TicketRef};
use super::repository::InvoiceRepository;
use crate::error::RepositoryError;
use crate::ticket::{TicketError, TicketRepository, TicketService};
use crate::types::{InvoiceId, Money, TicketId, UserId};
use async_trait::async_trait;
use chrono::TimeDelta;
use lottery_core::environment::Clock;
use lottery_core::event_bus::{EventBus, EventBusError, publish_event};
use lottery_core::transaction::TransactionError;
use lottery_runtime::TransactionManager;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

/// Errors from payment operations.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// The card failed local validation; nothing was charged
    #[error("Invalid card: {0}")]
    InvalidCard(#[from] CardError),

    /// The gateway refused the charge; nothing was charged
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// No invoice with this id
    #[error("Invoice {0} not found")]
    InvoiceNotFound(InvoiceId),

    /// The invoice belongs to someone else
    #[error("Invoice {invoice} is not owned by user {user}")]
    NotInvoiceOwner {
        /// Invoice
        invoice: InvoiceId,
        /// Paying user
        user: UserId,
    },

    /// The invoice is already PAID or OVERDUE
    #[error("Invoice {0} is not pending")]
    InvoiceNotPending(InvoiceId),

    /// The ticket could not be booked
    #[error("Booking failed: {0}")]
    Booking(#[from] TicketError),

    /// Storage failed
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    /// A transaction primitive failed
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// An invoice event could not be published
    #[error(transparent)]
    Publish(#[from] EventBusError),
}

/// Reserves a ticket for the buyer before an invoice is issued.
#[async_trait]
pub trait TicketBooking: Send + Sync {
    /// Give `ticket` to `user`.
    ///
    /// # Errors
    ///
    /// [`TicketError`] when the ticket is missing or already booked.
    async fn book(&self, user: UserId, ticket: TicketId) -> Result<(), TicketError>;
}

#[async_trait]
impl<R: TicketRepository> TicketBooking for TicketService<R> {
    async fn book(&self, user: UserId, ticket: TicketId) -> Result<(), TicketError> {
        self.book_ticket(user, ticket).await.map(|_| ())
    }
}

/// Pricing and routing of the payment service.
#[derive(Debug, Clone)]
pub struct PaymentSettings {
    /// Channel for `invoice_overdue` and `invoice_failure`
    pub channel: String,
    /// Price of one ticket
    pub ticket_price: Money,
    /// Time between issuing an invoice and its due date
    pub grace_period: TimeDelta,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            channel: "invoice_events".to_string(),
            ticket_price: Money::from_cents(10_000),
            grace_period: TimeDelta::minutes(15),
        }
    }
}

/// Payment service.
pub struct PaymentService<R> {
    repo: Arc<R>,
    transactions: TransactionManager<R>,
    booking: Arc<dyn TicketBooking>,
    gateway: Arc<dyn PaymentGateway>,
    events: Arc<dyn EventBus>,
    clock: Arc<dyn Clock>,
    settings: PaymentSettings,
}

impl<R: InvoiceRepository> PaymentService<R> {
    /// Create the service.
    #[must_use]
    pub fn new(
        repo: Arc<R>,
        booking: Arc<dyn TicketBooking>,
        gateway: Arc<dyn PaymentGateway>,
        events: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            transactions: TransactionManager::new(Arc::clone(&repo)),
            repo,
            booking,
            gateway,
            events,
            clock,
            settings,
        }
    }

    /// Override the transaction deadline.
    #[must_use]
    pub fn with_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transactions = self.transactions.with_timeout(timeout);
        self
    }

    /// Book `ticket` for `user` and issue a PENDING invoice for it.
    ///
    /// If the invoice cannot be stored after the booking succeeded, an
    /// `invoice_failure` event asks the ticket side to release the booking.
    ///
    /// # Errors
    ///
    /// [`PaymentError::Booking`], storage errors.
    pub async fn create_invoice(&self, user: UserId, ticket: TicketId) -> Result<Invoice, PaymentError> {
        self.booking.book(user, ticket).await?;

        match self.issue_invoice(user, ticket).await {
            Ok(invoice) => Ok(invoice),
            Err(err) => {
                let event = InvoiceEvent::failure(ticket);
                if let Err(publish_err) =
                    publish_event(self.events.as_ref(), &self.settings.channel, &event).await
                {
                    error!(
                        ticket_id = %ticket,
                        error = %publish_err,
                        "Invoice failed and the booking release could not be requested"
                    );
                }
                Err(err)
            }
        }
    }

    /// Issue a PENDING invoice for a ticket `user` already holds.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn create_invoice_for_booked_ticket(
        &self,
        user: UserId,
        ticket: TicketId,
    ) -> Result<Invoice, PaymentError> {
        self.issue_invoice(user, ticket).await
    }

    async fn issue_invoice(&self, user: UserId, ticket: TicketId) -> Result<Invoice, PaymentError> {
        let register_time = self.clock.now();
        let draft = NewInvoice {
            ticket: TicketRef { id: ticket },
            owner_id: user,
            amount: self.settings.ticket_price,
            register_time,
            due_date: register_time + self.settings.grace_period,
        };

        let repo = Arc::clone(&self.repo);
        let invoice = self
            .transactions
            .run(move |tx| Box::pin(async move { Ok::<_, PaymentError>(repo.create_invoice(tx, &draft).await?) }))
            .await?;

        info!(
            invoice_id = %invoice.id,
            ticket_id = %ticket,
            user_id = %user,
            amount = %invoice.amount,
            due_date = %invoice.due_date,
            "Invoice issued"
        );
        Ok(invoice)
    }

    /// Load an invoice.
    ///
    /// # Errors
    ///
    /// [`PaymentError::InvoiceNotFound`], storage errors.
    pub async fn get_invoice(&self, id: InvoiceId) -> Result<Invoice, PaymentError> {
        let repo = Arc::clone(&self.repo);
        self.transactions
            .run(move |tx| Box::pin(async move { Ok::<_, PaymentError>(repo.get_invoice(tx, id).await?) }))
            .await?
            .ok_or(PaymentError::InvoiceNotFound(id))
    }

    /// Payment attempts recorded for an invoice, oldest first.
    ///
    /// # Errors
    ///
    /// Storage errors.
    pub async fn invoice_payments(&self, id: InvoiceId) -> Result<Vec<Payment>, PaymentError> {
        let repo = Arc::clone(&self.repo);
        self.transactions
            .run(move |tx| {
                Box::pin(async move { Ok::<_, PaymentError>(repo.payments_for_invoice(tx, id).await?) })
            })
            .await
    }

    /// Charge `card` the invoice's amount and mark the invoice PAID.
    ///
    /// The amount is read before charging; ownership and status are checked
    /// in the same transaction that records the payment.
    ///
    /// Once the gateway has accepted the charge, any local failure (including
    /// a failed commit) refunds it exactly once and records a REJECTED payment.
    ///
    /// # Errors
    ///
    /// [`PaymentError::InvalidCard`], [`PaymentError::InvoiceNotFound`] and
    /// [`PaymentError::Gateway`] before any charge;
    /// [`PaymentError::NotInvoiceOwner`], [`PaymentError::InvoiceNotPending`]
    /// and storage errors after a compensated charge.
    pub async fn pay(&self, user: UserId, invoice: InvoiceId, card: &Card) -> Result<Payment, PaymentError> {
        let now = self.clock.now();
        card.validate(now)?;

        let amount = self.get_invoice(invoice).await?.amount;
        let charge = match self.gateway.charge(card, amount).await {
            Ok(charge) => charge,
            Err(e) => {
                metrics::counter!("lottery_payments_total", "status" => "declined").increment(1);
                warn!(invoice_id = %invoice, card = %card.last_four(), error = %e, "Charge declined");
                return Err(e.into());
            }
        };

        let repo = Arc::clone(&self.repo);
        let settled = self
            .transactions
            .run(move |tx| {
                Box::pin(async move {
                    let current = repo
                        .get_invoice(tx, invoice)
                        .await?
                        .ok_or(PaymentError::InvoiceNotFound(invoice))?;
                    if current.owner_id != user {
                        return Err(PaymentError::NotInvoiceOwner { invoice, user });
                    }
                    if !repo.set_invoice_status(tx, invoice, InvoiceStatus::Paid).await? {
                        return Err(PaymentError::InvoiceNotPending(invoice));
                    }
                    Ok::<_, PaymentError>(repo.create_payment(tx, invoice, PaymentStatus::Paid, now).await?)
                })
            })
            .await;

        match settled {
            Ok(payment) => {
                metrics::counter!("lottery_payments_total", "status" => PaymentStatus::Paid.as_str()).increment(1);
                info!(invoice_id = %invoice, payment_id = %payment.id, transaction = %charge, "Invoice paid");
                Ok(payment)
            }
            Err(err) => {
                warn!(invoice_id = %invoice, transaction = %charge, error = %err, "Payment not recorded, compensating");
                self.compensate(invoice, &charge).await;
                Err(err)
            }
        }
    }

    async fn compensate(&self, invoice: InvoiceId, charge: &GatewayTransactionId) {
        match self.gateway.refund(charge).await {
            Ok(()) => {
                metrics::counter!("lottery_refunds_total", "outcome" => "refunded").increment(1);
                info!(invoice_id = %invoice, transaction = %charge, "Charge refunded");
            }
            Err(e) => {
                metrics::counter!("lottery_refunds_total", "outcome" => "failed").increment(1);
                error!(invoice_id = %invoice, transaction = %charge, error = %e, "Refund failed");
            }
        }

        let repo = Arc::clone(&self.repo);
        let at = self.clock.now();
        let rejected = self
            .transactions
            .run(move |tx| {
                Box::pin(async move {
                    Ok::<_, PaymentError>(repo.create_payment(tx, invoice, PaymentStatus::Rejected, at).await?)
                })
            })
            .await;

        match rejected {
            Ok(_) => {
                metrics::counter!("lottery_payments_total", "status" => PaymentStatus::Rejected.as_str()).increment(1);
            }
            Err(e) => error!(invoice_id = %invoice, error = %e, "Rejected payment could not be recorded"),
        }
    }

    /// Mark every pending invoice past its due date as OVERDUE and announce
    /// it with `invoice_overdue`.
    ///
    /// Each invoice is handled in its own transaction with the event
    /// published before commit. A failing invoice is logged and skipped.
    /// Returns how many invoices were marked.
    ///
    /// # Errors
    ///
    /// Storage errors while listing pending invoices.
    pub async fn process_invoices(&self) -> Result<usize, PaymentError> {
        let repo = Arc::clone(&self.repo);
        let pending = self
            .transactions
            .run(move |tx| Box::pin(async move { Ok::<_, PaymentError>(repo.pending_invoices(tx).await?) }))
            .await?;

        let now = self.clock.now();
        let mut marked = 0;
        for invoice in pending.into_iter().filter(|invoice| invoice.due_date <= now) {
            match self.expire(&invoice).await {
                Ok(true) => {
                    marked += 1;
                    metrics::counter!("lottery_invoices_overdue_total").increment(1);
                    info!(invoice_id = %invoice.id, ticket_id = %invoice.ticket.id, "Invoice overdue");
                }
                Ok(false) => {}
                Err(e) => error!(invoice_id = %invoice.id, error = %e, "Failed to expire invoice"),
            }
        }
        Ok(marked)
    }

    async fn expire(&self, invoice: &Invoice) -> Result<bool, PaymentError> {
        let repo = Arc::clone(&self.repo);
        let events = Arc::clone(&self.events);
        let channel = self.settings.channel.clone();
        let id = invoice.id;
        let event = InvoiceEvent::overdue(invoice.ticket.id);

        self.transactions
            .run(move |tx| {
                Box::pin(async move {
                    if !repo.set_invoice_status(tx, id, InvoiceStatus::Overdue).await? {
                        return Ok(false);
                    }
                    publish_event(events.as_ref(), &channel, &event).await?;
                    Ok::<_, PaymentError>(true)
                })
            })
            .await
    }
}
