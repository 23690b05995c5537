use crate::types::TicketId;
use lottery_core::event::Event;
use serde::{Deserialize, Serialize};

/// Invoice outcomes that hand a ticket back to the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceEventKind {
    /// The invoice passed its due date unpaid
    InvoiceOverdue,
    /// The invoice for a booked ticket could not be created
    InvoiceFailure,
}

impl InvoiceEventKind {
    /// Wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvoiceOverdue => "invoice_overdue",
            Self::InvoiceFailure => "invoice_failure",
        }
    }
}

/// `{"type": "invoice_overdue", "ticket_id": 12}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceEvent {
    /// What happened
    #[serde(rename = "type")]
    pub kind: InvoiceEventKind,
    /// Ticket whose booking should be released
    pub ticket_id: TicketId,
}

impl InvoiceEvent {
    /// The invoice for `ticket_id` lapsed.
    #[must_use]
    pub const fn overdue(ticket_id: TicketId) -> Self {
        Self {
            kind: InvoiceEventKind::InvoiceOverdue,
            ticket_id,
        }
    }

    /// No invoice could be issued for `ticket_id`.
    #[must_use]
    pub const fn failure(ticket_id: TicketId) -> Self {
        Self {
            kind: InvoiceEventKind::InvoiceFailure,
            ticket_id,
        }
    }
}

impl Event for InvoiceEvent {
    fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }
}
