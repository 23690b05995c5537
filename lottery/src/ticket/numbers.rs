//! Ticket number generation and validation.
//!
//! Numbers are stored as two-digit strings (`"01"`..`"99"`) and compared by
//! value, so `"7"` and `"07"` are the same number.

use crate::types::LotteryConfig;
use rand::Rng;
use rand::rngs::OsRng;
use std::collections::HashSet;
use thiserror::Error;

/// Why a set of ticket numbers was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumbersError {
    /// Wrong number of values
    #[error("expected {expected} numbers, got {actual}")]
    WrongCount {
        /// Pick count of the draw
        expected: usize,
        /// Values supplied
        actual: usize,
    },

    /// A value is not an integer
    #[error("'{0}' is not a number")]
    NotANumber(String),

    /// A value is outside `1..=max`
    #[error("{value} is outside 1..={max}")]
    OutOfRange {
        /// Offending value
        value: u32,
        /// Highest allowed number
        max: u32,
    },

    /// A value appears twice
    #[error("{0} is picked more than once")]
    Duplicate(u32),
}

/// Two-digit rendering used in storage and on the wire.
#[must_use]
pub fn format_number(value: u32) -> String {
    format!("{value:02}")
}

/// Draw `config.pick()` distinct numbers uniformly from `1..=config.max()`
/// using `rng`, redrawing collisions.
pub fn generate_with<R: Rng + ?Sized>(config: LotteryConfig, rng: &mut R) -> Vec<String> {
    // LotteryConfig guarantees pick <= max, so this terminates.
    let pick = config.pick() as usize;
    let mut seen = HashSet::with_capacity(pick);
    let mut numbers = Vec::with_capacity(pick);
    while numbers.len() < pick {
        let value = rng.gen_range(1..=config.max());
        if seen.insert(value) {
            numbers.push(format_number(value));
        }
    }
    numbers
}

/// Draw a ticket's numbers from the operating system's CSPRNG.
#[must_use]
pub fn generate(config: LotteryConfig) -> Vec<String> {
    generate_with(config, &mut OsRng)
}

/// Check user-picked numbers against `config` and return them normalized to
/// two digits, in the order given.
///
/// # Errors
///
/// Returns the first [`NumbersError`] found.
pub fn normalize(config: LotteryConfig, numbers: &[String]) -> Result<Vec<String>, NumbersError> {
    let expected = config.pick() as usize;
    if numbers.len() != expected {
        return Err(NumbersError::WrongCount {
            expected,
            actual: numbers.len(),
        });
    }

    let mut seen = HashSet::with_capacity(expected);
    numbers
        .iter()
        .map(|raw| {
            let value: u32 = raw
                .trim()
                .parse()
                .map_err(|_| NumbersError::NotANumber(raw.clone()))?;
            if value == 0 || value > config.max() {
                return Err(NumbersError::OutOfRange {
                    value,
                    max: config.max(),
                });
            }
            if !seen.insert(value) {
                return Err(NumbersError::Duplicate(value));
            }
            Ok(format_number(value))
        })
        .collect()
}
