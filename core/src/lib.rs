//! # Lottery Core
//!
//! Core traits and types shared by every lottery service.
//!
//! The services coordinate a draw lifecycle across process boundaries. Each one
//! commits a local database transaction and then publishes a notification on a
//! fire-and-forget transport. This crate only defines the seams:
//!
//! - [`environment::Clock`]: injected "now", so time can be controlled in tests
//! - [`event::Event`]: JSON envelopes carried on the transport
//! - [`event_bus::EventBus`]: publish/subscribe over named channels
//! - [`transaction::TransactionSource`] / [`transaction::TransactionHandle`]:
//!   explicit transaction objects with savepoint primitives
//!
//! Concrete implementations live in `lottery-postgres`, `lottery-redis`, and
//! `lottery-testing`. Orchestration (transaction manager, scheduler, consumers)
//! lives in `lottery-runtime`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod event;
pub mod event_bus;
pub mod transaction;

/// Environment traits - injected dependencies.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};
    use chrono::Utc;

    #[test]
    fn system_clock_tracks_wall_time() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }
}
