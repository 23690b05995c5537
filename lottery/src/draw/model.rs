use crate::types::{DrawId, LotteryConfig, ParseStatusError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle state of a draw.
///
/// ```text
/// PLANNED ──► ACTIVE ──► COMPLETED
///    │          │
///    └──────────┴──────► CANCELLED
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawStatus {
    /// Scheduled, tickets not yet on sale
    Planned,
    /// Tickets on sale
    Active,
    /// Drawn
    Completed,
    /// Called off
    Cancelled,
}

impl DrawStatus {
    /// Stored and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Planned => "PLANNED",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether a draw in this state may move to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Planned, Self::Active | Self::Cancelled)
                | (Self::Active, Self::Completed | Self::Cancelled)
        )
    }
}

impl fmt::Display for DrawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DrawStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PLANNED" => Ok(Self::Planned),
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(ParseStatusError {
                kind: "draw status",
                value: other.to_string(),
            }),
        }
    }
}

/// A scheduled lottery round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draw {
    /// Identifier
    pub id: DrawId,
    /// Pick count and number range
    pub lottery_type: LotteryConfig,
    /// When ticket sales open
    pub start_time: DateTime<Utc>,
    /// When the draw closes
    pub end_time: DateTime<Utc>,
    /// Current state
    pub status: DrawStatus,
}

/// Winning numbers recorded for a draw.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    /// Row identifier
    pub id: i64,
    /// Draw the result belongs to
    pub draw_id: DrawId,
    /// Two-digit winning numbers
    pub winning_combination: Vec<String>,
    /// When the numbers were drawn
    pub result_time: DateTime<Utc>,
}

/// A draw to be created in the PLANNED state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewDraw {
    /// Pick count and number range
    pub lottery_type: LotteryConfig,
    /// When ticket sales open
    pub start_time: DateTime<Utc>,
    /// When the draw closes
    pub end_time: DateTime<Utc>,
}
