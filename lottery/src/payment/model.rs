use crate::types::{InvoiceId, Money, ParseStatusError, PaymentId, TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settlement state of an invoice. PAID and OVERDUE are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Awaiting payment
    Pending,
    /// Settled
    Paid,
    /// Not paid before the due date
    Overdue,
}

impl InvoiceStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Overdue => "OVERDUE",
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "OVERDUE" => Ok(Self::Overdue),
            other => Err(ParseStatusError {
                kind: "invoice status",
                value: other.to_string(),
            }),
        }
    }
}

/// Outcome of one charge attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Charged and recorded
    Paid,
    /// Charged, then refunded because it could not be recorded
    Rejected,
}

impl PaymentStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paid => "PAID",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PAID" => Ok(Self::Paid),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(ParseStatusError {
                kind: "payment status",
                value: other.to_string(),
            }),
        }
    }
}

/// Ticket reference embedded in an invoice (`ticket_data` column).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRef {
    /// The ticket being bought
    pub id: TicketId,
}

/// A request to pay for one ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Identifier
    pub id: InvoiceId,
    /// Ticket being bought
    #[serde(rename = "ticket_data")]
    pub ticket: TicketRef,
    /// Buyer
    pub owner_id: UserId,
    /// Price
    pub amount: Money,
    /// Settlement state
    pub status: InvoiceStatus,
    /// When the invoice was issued
    pub register_time: DateTime<Utc>,
    /// After this instant a pending invoice is overdue
    pub due_date: DateTime<Utc>,
}

/// An invoice to insert in the PENDING state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewInvoice {
    /// Ticket being bought
    pub ticket: TicketRef,
    /// Buyer
    pub owner_id: UserId,
    /// Price
    pub amount: Money,
    /// Issue time
    pub register_time: DateTime<Utc>,
    /// Issue time plus the grace period
    pub due_date: DateTime<Utc>,
}

/// Append-only record of a charge attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Identifier
    pub id: PaymentId,
    /// Invoice charged
    pub invoice_id: InvoiceId,
    /// Outcome
    pub status: PaymentStatus,
    /// When the outcome was recorded
    pub payment_time: DateTime<Utc>,
}
