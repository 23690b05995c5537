use super::model::{Invoice, InvoiceStatus, NewInvoice, Payment, PaymentStatus, TicketRef};
use crate::error::RepositoryError;
use crate::types::{InvoiceId, Money, PaymentId, UserId};
use chrono::{DateTime, Utc};
use lottery_core::transaction::{TransactionError, TransactionSource};
use lottery_postgres::{PgTransaction, PgTransactionSource};
use sqlx::PgPool;
use sqlx::types::Json;
use std::future::Future;

/// Storage of invoices and the payments made against them.
pub trait InvoiceRepository: TransactionSource + 'static {
    /// Insert a PENDING invoice.
    fn create_invoice(
        &self,
        tx: &mut Self::Handle,
        invoice: &NewInvoice,
    ) -> impl Future<Output = Result<Invoice, RepositoryError>> + Send;

    /// Load one invoice.
    fn get_invoice(
        &self,
        tx: &mut Self::Handle,
        id: InvoiceId,
    ) -> impl Future<Output = Result<Option<Invoice>, RepositoryError>> + Send;

    /// Every PENDING invoice, ordered by id.
    fn pending_invoices(
        &self,
        tx: &mut Self::Handle,
    ) -> impl Future<Output = Result<Vec<Invoice>, RepositoryError>> + Send;

    /// Move a PENDING invoice to `status`. `false` when the invoice is missing
    /// or no longer pending.
    fn set_invoice_status(
        &self,
        tx: &mut Self::Handle,
        id: InvoiceId,
        status: InvoiceStatus,
    ) -> impl Future<Output = Result<bool, RepositoryError>> + Send;

    /// Append a payment record.
    fn create_payment(
        &self,
        tx: &mut Self::Handle,
        invoice: InvoiceId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<Payment, RepositoryError>> + Send;

    /// Payments recorded for an invoice, oldest first.
    fn payments_for_invoice(
        &self,
        tx: &mut Self::Handle,
        invoice: InvoiceId,
    ) -> impl Future<Output = Result<Vec<Payment>, RepositoryError>> + Send;
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    ticket_data: Json<TicketRef>,
    owner_id: i64,
    amount_cents: i64,
    status: String,
    register_time: DateTime<Utc>,
    due_date: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = RepositoryError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        let cents = u64::try_from(row.amount_cents).map_err(RepositoryError::decode)?;
        Ok(Self {
            id: InvoiceId::new(row.id),
            ticket: row.ticket_data.0,
            owner_id: UserId::new(row.owner_id),
            amount: Money::from_cents(cents),
            status: row.status.parse().map_err(RepositoryError::decode)?,
            register_time: row.register_time,
            due_date: row.due_date,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: i64,
    invoice_id: i64,
    status: String,
    payment_time: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = RepositoryError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: PaymentId::new(row.id),
            invoice_id: InvoiceId::new(row.invoice_id),
            status: row.status.parse().map_err(RepositoryError::decode)?,
            payment_time: row.payment_time,
        })
    }
}

const INVOICE_COLUMNS: &str = "id, ticket_data, owner_id, amount_cents, status, register_time, due_date";
const PAYMENT_COLUMNS: &str = "id, invoice_id, status, payment_time";

/// `PostgreSQL` invoice repository over `payment.invoices` and
/// `payment.payments`.
#[derive(Debug, Clone)]
pub struct PgInvoiceRepository {
    source: PgTransactionSource,
}

impl PgInvoiceRepository {
    /// Create a repository on `pool`.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self {
            source: PgTransactionSource::new(pool),
        }
    }
}

impl TransactionSource for PgInvoiceRepository {
    type Handle = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction, TransactionError> {
        self.source.begin().await
    }
}

impl InvoiceRepository for PgInvoiceRepository {
    async fn create_invoice(&self, tx: &mut PgTransaction, invoice: &NewInvoice) -> Result<Invoice, RepositoryError> {
        let amount = i64::try_from(invoice.amount.cents()).map_err(RepositoryError::decode)?;
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "INSERT INTO payment.invoices (ticket_data, owner_id, amount_cents, status, register_time, due_date)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(Json(invoice.ticket))
        .bind(invoice.owner_id.get())
        .bind(amount)
        .bind(InvoiceStatus::Pending.as_str())
        .bind(invoice.register_time)
        .bind(invoice.due_date)
        .fetch_one(tx.connection())
        .await?;
        row.try_into()
    }

    async fn get_invoice(&self, tx: &mut PgTransaction, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        sqlx::query_as::<_, InvoiceRow>(&format!("SELECT {INVOICE_COLUMNS} FROM payment.invoices WHERE id = $1"))
            .bind(id.get())
            .fetch_optional(tx.connection())
            .await?
            .map(Invoice::try_from)
            .transpose()
    }

    async fn pending_invoices(&self, tx: &mut PgTransaction) -> Result<Vec<Invoice>, RepositoryError> {
        sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM payment.invoices WHERE status = $1 ORDER BY id"
        ))
        .bind(InvoiceStatus::Pending.as_str())
        .fetch_all(tx.connection())
        .await?
        .into_iter()
        .map(Invoice::try_from)
        .collect()
    }

    async fn set_invoice_status(
        &self,
        tx: &mut PgTransaction,
        id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE payment.invoices SET status = $1 WHERE id = $2 AND status = $3")
            .bind(status.as_str())
            .bind(id.get())
            .bind(InvoiceStatus::Pending.as_str())
            .execute(tx.connection())
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn create_payment(
        &self,
        tx: &mut PgTransaction,
        invoice: InvoiceId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Payment, RepositoryError> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "INSERT INTO payment.payments (invoice_id, status, payment_time)
             VALUES ($1, $2, $3)
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(invoice.get())
        .bind(status.as_str())
        .bind(at)
        .fetch_one(tx.connection())
        .await?;
        row.try_into()
    }

    async fn payments_for_invoice(
        &self,
        tx: &mut PgTransaction,
        invoice: InvoiceId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment.payments WHERE invoice_id = $1 ORDER BY id"
        ))
        .bind(invoice.get())
        .fetch_all(tx.connection())
        .await?
        .into_iter()
        .map(Payment::try_from)
        .collect()
    }
}
