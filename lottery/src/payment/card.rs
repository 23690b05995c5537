//! Local card checks, run before the gateway is contacted.

use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why a card was rejected locally.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardError {
    /// Not 13 to 19 digits
    #[error("invalid card number format")]
    InvalidNumber,

    /// Not 3 or 4 digits
    #[error("invalid CVV format")]
    InvalidCvv,

    /// Not `MM/YY`
    #[error("invalid expiration date format")]
    InvalidExpiry,

    /// The expiry month has ended
    #[error("card has expired")]
    Expired,
}

/// Payment card details.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Primary account number
    pub number: String,
    /// Expiry as `MM/YY`
    pub expiry: String,
    /// Security code
    pub cvv: String,
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail = self.number.get(self.number.len().saturating_sub(4)..).unwrap_or_default();
        f.debug_struct("Card")
            .field("number", &format_args!("****{tail}"))
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

fn all_digits(s: &str, len: std::ops::RangeInclusive<usize>) -> bool {
    len.contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
}

impl Card {
    /// Create a card.
    #[must_use]
    pub fn new(number: impl Into<String>, expiry: impl Into<String>, cvv: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            expiry: expiry.into(),
            cvv: cvv.into(),
        }
    }

    /// Check the format and that the card is still valid at `now`.
    ///
    /// A card is valid through the last day of its expiry month.
    ///
    /// # Errors
    ///
    /// The first [`CardError`] found.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<(), CardError> {
        if !all_digits(&self.number, 13..=19) {
            return Err(CardError::InvalidNumber);
        }
        if !all_digits(&self.cvv, 3..=4) {
            return Err(CardError::InvalidCvv);
        }

        let valid_until = self.expiry_end().ok_or(CardError::InvalidExpiry)?;
        if now.date_naive() >= valid_until {
            return Err(CardError::Expired);
        }
        Ok(())
    }

    /// First day after the expiry month.
    fn expiry_end(&self) -> Option<NaiveDate> {
        let (month, year) = self.expiry.split_once('/')?;
        if !all_digits(month, 2..=2) || !all_digits(year, 2..=2) {
            return None;
        }
        let month: u32 = month.parse().ok()?;
        let year: i32 = year.parse().ok()?;
        NaiveDate::from_ymd_opt(2000 + year, month, 1)?.checked_add_months(Months::new(1))
    }

    /// Last four digits, for logs.
    #[must_use]
    pub fn last_four(&self) -> &str {
        self.number.get(self.number.len().saturating_sub(4)..).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).single().unwrap_or_default()
    }

    #[test]
    fn valid_card_passes() {
        let card = Card::new("4111111111111111", "12/27", "123");
        assert_eq!(card.validate(at(2025, 1, 1)), Ok(()));
    }

    #[test]
    fn card_is_valid_through_its_expiry_month() {
        let card = Card::new("4111111111111111", "01/25", "123");
        assert_eq!(card.validate(at(2025, 1, 31)), Ok(()));
        assert_eq!(card.validate(at(2025, 2, 1)), Err(CardError::Expired));
    }

    #[test]
    fn december_expiry_rolls_into_next_year() {
        let card = Card::new("4111111111111111", "12/25", "1234");
        assert_eq!(card.validate(at(2025, 12, 31)), Ok(()));
        assert_eq!(card.validate(at(2026, 1, 1)), Err(CardError::Expired));
    }

    #[test]
    fn malformed_fields_are_rejected_in_order() {
        let now = at(2025, 1, 1);
        assert_eq!(Card::new("4111", "12/27", "123").validate(now), Err(CardError::InvalidNumber));
        assert_eq!(
            Card::new("41111111111111111111", "12/27", "123").validate(now),
            Err(CardError::InvalidNumber)
        );
        assert_eq!(
            Card::new("4111-1111-1111-1111", "12/27", "123").validate(now),
            Err(CardError::InvalidNumber)
        );
        assert_eq!(Card::new("4111111111111111", "12/27", "12").validate(now), Err(CardError::InvalidCvv));
        assert_eq!(Card::new("4111111111111111", "13/27", "123").validate(now), Err(CardError::InvalidExpiry));
        assert_eq!(Card::new("4111111111111111", "00/27", "123").validate(now), Err(CardError::InvalidExpiry));
        assert_eq!(Card::new("4111111111111111", "1/27", "123").validate(now), Err(CardError::InvalidExpiry));
        assert_eq!(Card::new("4111111111111111", "12-27", "123").validate(now), Err(CardError::InvalidExpiry));
    }

    #[test]
    fn debug_output_masks_the_number() {
        let card = Card::new("4111111111111234", "12/27", "999");
        let printed = format!("{card:?}");
        assert!(printed.contains("****1234"));
        assert!(!printed.contains("4111111111111234"));
        assert!(!printed.contains("999"));
        assert_eq!(card.last_four(), "1234");
    }
}
