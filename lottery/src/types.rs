//! Value types shared by the draw, ticket, and payment services.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a database identifier.
            #[must_use]
            pub const fn new(id: i64) -> Self {
                Self(id)
            }

            /// The raw identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a draw
    DrawId
);
id_type!(
    /// Identifier of a ticket
    TicketId
);
id_type!(
    /// Identifier of an invoice
    InvoiceId
);
id_type!(
    /// Identifier of a payment record
    PaymentId
);
id_type!(
    /// Identifier of a platform user
    UserId
);

// ============================================================================
// Lottery configuration
// ============================================================================

/// Numbers are rendered with two digits, which bounds the range.
pub const MAX_NUMBER: u32 = 99;

/// A stored value does not name a known variant.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} '{value}'")]
pub struct ParseStatusError {
    /// What was being parsed
    pub kind: &'static str,
    /// The rejected value
    pub value: String,
}

/// Errors parsing a lottery configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LotteryConfigError {
    /// Not of the form `N from M`
    #[error("Malformed lottery type '{0}', expected \"N from M\"")]
    Malformed(String),

    /// The pick count or range is unusable
    #[error("Invalid lottery type: cannot pick {pick} numbers from 1..={max}")]
    OutOfRange {
        /// Numbers per ticket
        pick: u32,
        /// Highest number
        max: u32,
    },
}

/// How many numbers a ticket holds and the highest number allowed,
/// written `"5 from 36"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LotteryConfig {
    pick: u32,
    max: u32,
}

impl LotteryConfig {
    /// Build a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryConfigError::OutOfRange`] unless
    /// `1 <= pick <= max <= 99`.
    pub const fn new(pick: u32, max: u32) -> Result<Self, LotteryConfigError> {
        if pick == 0 || pick > max || max > MAX_NUMBER {
            return Err(LotteryConfigError::OutOfRange { pick, max });
        }
        Ok(Self { pick, max })
    }

    /// Numbers per ticket.
    #[must_use]
    pub const fn pick(&self) -> u32 {
        self.pick
    }

    /// Highest number that may be picked.
    #[must_use]
    pub const fn max(&self) -> u32 {
        self.max
    }
}

impl fmt::Display for LotteryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.pick, self.max)
    }
}

impl FromStr for LotteryConfig {
    type Err = LotteryConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || LotteryConfigError::Malformed(s.to_string());
        let (pick, max) = s.trim().split_once(" from ").ok_or_else(malformed)?;
        let pick = pick.trim().parse().map_err(|_| malformed())?;
        let max = max.trim().parse().map_err(|_| malformed())?;
        Self::new(pick, max)
    }
}

impl TryFrom<String> for LotteryConfig {
    type Error = LotteryConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LotteryConfig> for String {
    fn from(config: LotteryConfig) -> Self {
        config.to_string()
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// An amount in cents.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn lottery_type_round_trips_through_text() {
        let config: LotteryConfig = "5 from 36".parse().unwrap();
        assert_eq!(config.pick(), 5);
        assert_eq!(config.max(), 36);
        assert_eq!(config.to_string(), "5 from 36");
    }

    #[test]
    fn lottery_type_serializes_as_string() {
        let config = LotteryConfig::new(6, 49).unwrap();
        assert_eq!(serde_json::to_string(&config).unwrap(), "\"6 from 49\"");
        let parsed: LotteryConfig = serde_json::from_str("\"6 from 49\"").unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn unusable_lottery_types_are_rejected() {
        assert!(matches!(
            "5 of 36".parse::<LotteryConfig>(),
            Err(LotteryConfigError::Malformed(_))
        ));
        assert!(matches!(
            "7 from 5".parse::<LotteryConfig>(),
            Err(LotteryConfigError::OutOfRange { pick: 7, max: 5 })
        ));
        assert!("0 from 10".parse::<LotteryConfig>().is_err());
        assert!("5 from 100".parse::<LotteryConfig>().is_err());
        assert!(serde_json::from_str::<LotteryConfig>("\"five from 36\"").is_err());
    }

    #[test]
    fn ids_are_transparent_on_the_wire() {
        assert_eq!(serde_json::to_string(&TicketId::new(12)).unwrap(), "12");
        assert_eq!(DrawId::new(7).to_string(), "7");
    }

    #[test]
    fn money_displays_as_decimal() {
        assert_eq!(Money::from_cents(10_000).to_string(), "100.00");
        assert_eq!(Money::from_cents(1_005).to_string(), "10.05");
    }
}
