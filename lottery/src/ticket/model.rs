use crate::draw::{Draw, DrawStatus};
use crate::types::{DrawId, LotteryConfig, ParseStatusError, TicketId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result state of a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Not yet decided
    Pending,
    /// Winning ticket
    Win,
    /// Losing ticket
    Lose,
}

impl TicketStatus {
    /// Stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Win => "WIN",
            Self::Lose => "LOSE",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "WIN" => Ok(Self::Win),
            "LOSE" => Ok(Self::Lose),
            other => Err(ParseStatusError {
                kind: "ticket status",
                value: other.to_string(),
            }),
        }
    }
}

/// A set of numbers entered in a draw.
///
/// `user_id` is unset for system-generated tickets that have not been booked.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Identifier
    pub id: TicketId,
    /// Owner, if booked
    pub user_id: Option<UserId>,
    /// Draw the ticket takes part in
    pub draw_id: DrawId,
    /// Two-digit numbers
    pub numbers: Vec<String>,
    /// Result state
    pub status: TicketStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl Ticket {
    /// Whether the ticket is free to book.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.user_id.is_none()
    }
}

/// A ticket together with the draw it takes part in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketWithDraw {
    /// The ticket
    #[serde(flatten)]
    pub ticket: Ticket,
    /// Its draw
    pub draw: Draw,
}

/// A ticket to insert in the PENDING state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewTicket {
    /// Owner, `None` for the system pool
    pub user_id: Option<UserId>,
    /// Draw
    pub draw_id: DrawId,
    /// Validated, two-digit numbers
    pub numbers: Vec<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// What the ticket side needs to know about a draw.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawInfo {
    /// Current draw state
    pub status: DrawStatus,
    /// Pick count and range
    pub lottery_type: LotteryConfig,
}

impl From<&Draw> for DrawInfo {
    fn from(draw: &Draw) -> Self {
        Self {
            status: draw.status,
            lottery_type: draw.lottery_type,
        }
    }
}
