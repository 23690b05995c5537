use super::model::{Invoice, InvoiceStatus, NewInvoice, Payment, PaymentStatus};
use super::repository::InvoiceRepository;
use crate::error::RepositoryError;
use crate::types::{InvoiceId, PaymentId};
use chrono::{DateTime, Utc};
use lottery_core::transaction::{TransactionError, TransactionSource};
use lottery_testing::{MemoryStore, MemoryTransaction};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Invoice and payment tables held by [`InMemoryInvoiceRepository`].
#[derive(Debug, Clone, Default)]
pub struct InvoiceTables {
    invoices: BTreeMap<InvoiceId, Invoice>,
    payments: BTreeMap<PaymentId, Payment>,
    next_invoice_id: i64,
    next_payment_id: i64,
}

/// Invoice repository over a [`MemoryStore`], for tests and local runs.
#[derive(Debug, Clone)]
pub struct InMemoryInvoiceRepository {
    store: MemoryStore<InvoiceTables>,
    invoice_faults: Arc<AtomicUsize>,
    status_faults: Arc<AtomicUsize>,
}

impl Default for InMemoryInvoiceRepository {
    fn default() -> Self {
        Self {
            store: MemoryStore::new(InvoiceTables::default()),
            invoice_faults: Arc::new(AtomicUsize::new(0)),
            status_faults: Arc::new(AtomicUsize::new(0)),
        }
    }
}

fn take_fault(faults: &AtomicUsize, what: &str) -> Result<(), RepositoryError> {
    if faults
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
    {
        return Err(RepositoryError::Unavailable(format!("injected {what} failure")));
    }
    Ok(())
}

impl InMemoryInvoiceRepository {
    /// Empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The underlying store, for transaction statistics and commit faults.
    #[must_use]
    pub const fn store(&self) -> &MemoryStore<InvoiceTables> {
        &self.store
    }

    /// Store `invoice` as committed state, keeping its id.
    pub fn insert(&self, invoice: Invoice) {
        self.store.seed(|tables| {
            tables.next_invoice_id = tables.next_invoice_id.max(invoice.id.get());
            tables.invoices.insert(invoice.id, invoice);
        });
    }

    /// Committed invoice with `id`.
    #[must_use]
    pub fn invoice(&self, id: InvoiceId) -> Option<Invoice> {
        self.store.snapshot().invoices.get(&id).cloned()
    }

    /// Every committed payment, ordered by id.
    #[must_use]
    pub fn payments(&self) -> Vec<Payment> {
        self.store.snapshot().payments.into_values().collect()
    }

    /// Fail the next `count` invoice inserts.
    pub fn fail_next_invoice_inserts(&self, count: usize) {
        self.invoice_faults.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` invoice status updates.
    pub fn fail_next_status_updates(&self, count: usize) {
        self.status_faults.store(count, Ordering::SeqCst);
    }
}

impl TransactionSource for InMemoryInvoiceRepository {
    type Handle = MemoryTransaction<InvoiceTables>;

    async fn begin(&self) -> Result<Self::Handle, TransactionError> {
        self.store.begin_now()
    }
}

impl InvoiceRepository for InMemoryInvoiceRepository {
    async fn create_invoice(&self, tx: &mut Self::Handle, invoice: &NewInvoice) -> Result<Invoice, RepositoryError> {
        take_fault(&self.invoice_faults, "invoice insert")?;
        let tables = tx.state_mut();
        tables.next_invoice_id += 1;
        let invoice = Invoice {
            id: InvoiceId::new(tables.next_invoice_id),
            ticket: invoice.ticket,
            owner_id: invoice.owner_id,
            amount: invoice.amount,
            status: InvoiceStatus::Pending,
            register_time: invoice.register_time,
            due_date: invoice.due_date,
        };
        tables.invoices.insert(invoice.id, invoice.clone());
        Ok(invoice)
    }

    async fn get_invoice(&self, tx: &mut Self::Handle, id: InvoiceId) -> Result<Option<Invoice>, RepositoryError> {
        Ok(tx.state().invoices.get(&id).cloned())
    }

    async fn pending_invoices(&self, tx: &mut Self::Handle) -> Result<Vec<Invoice>, RepositoryError> {
        Ok(tx
            .state()
            .invoices
            .values()
            .filter(|invoice| invoice.status == InvoiceStatus::Pending)
            .cloned()
            .collect())
    }

    async fn set_invoice_status(
        &self,
        tx: &mut Self::Handle,
        id: InvoiceId,
        status: InvoiceStatus,
    ) -> Result<bool, RepositoryError> {
        take_fault(&self.status_faults, "invoice update")?;
        match tx.state_mut().invoices.get_mut(&id) {
            Some(invoice) if invoice.status == InvoiceStatus::Pending => {
                invoice.status = status;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn create_payment(
        &self,
        tx: &mut Self::Handle,
        invoice: InvoiceId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Payment, RepositoryError> {
        let tables = tx.state_mut();
        tables.next_payment_id += 1;
        let payment = Payment {
            id: PaymentId::new(tables.next_payment_id),
            invoice_id: invoice,
            status,
            payment_time: at,
        };
        tables.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn payments_for_invoice(
        &self,
        tx: &mut Self::Handle,
        invoice: InvoiceId,
    ) -> Result<Vec<Payment>, RepositoryError> {
        Ok(tx
            .state()
            .payments
            .values()
            .filter(|payment| payment.invoice_id == invoice)
            .cloned()
            .collect())
    }
}
