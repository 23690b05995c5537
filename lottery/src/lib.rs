//! # Lottery
//!
//! Draw lifecycle, ticket pool, and payment services.
//!
//! - [`draw`]: the PLANNED → ACTIVE → COMPLETED state machine, driven by
//!   periodic sweeps, with cancellation
//! - [`ticket`]: user-picked tickets, the system pool generated when a draw
//!   opens, bookings, and results
//! - [`payment`]: invoices for booked tickets, the card payment saga with
//!   compensating refunds, and the overdue sweep
//!
//! Every service keeps its state in `PostgreSQL` behind a repository trait and
//! talks to the others through JSON events on Redis. In-memory repositories
//! over [`lottery_testing::MemoryStore`] back the tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod app;
pub mod config;
pub mod draw;
pub mod error;
pub mod metrics;
pub mod payment;
pub mod ticket;
pub mod types;

pub use config::{Config, ConfigError};
pub use error::RepositoryError;
pub use types::{DrawId, InvoiceId, LotteryConfig, Money, PaymentId, TicketId, UserId};
