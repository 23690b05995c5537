//! # Lottery Runtime
//!
//! Orchestration shared by every lottery service:
//!
//! - [`transaction::TransactionManager`]: top-level transactions and savepoint nesting
//! - [`scheduler::Scheduler`]: run-now-then-every-interval jobs with a [`retry::RetryPolicy`]
//! - [`consumer::EventConsumer`]: subscribe-process-resubscribe loops over an event bus
//! - [`lifecycle::Lifecycle`]: task supervision, shutdown broadcast, and cleanup callbacks
//! - [`metrics::MetricsServer`]: Prometheus exporter

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;
pub mod lifecycle;
pub mod metrics;
pub mod retry;
pub mod scheduler;
pub mod transaction;

pub use consumer::{ConsumerError, EventConsumer, EventHandler, HandlerError};
pub use lifecycle::{Lifecycle, LifecycleError, shutdown_signal};
pub use retry::RetryPolicy;
pub use scheduler::Scheduler;
pub use transaction::TransactionManager;
