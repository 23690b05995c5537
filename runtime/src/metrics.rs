//! Prometheus metrics exporter.
//!
//! Every service exposes its counters on an HTTP endpoint for scraping:
//!
//! ```rust,no_run
//! use lottery_runtime::metrics::MetricsServer;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::describe_counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build or install the exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus metrics endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the global recorder, start serving `/metrics`, and describe
    /// the runtime counters.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Install`] if the listener cannot be started. A
    /// recorder that is already installed is reported as a warning instead.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Install(e.to_string()))?;
        let handle = recorder.handle();

        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        let addr = self.addr;
        tokio::spawn(async move {
            if let Err(_e) = exporter.await {
                tracing::error!(%addr, "Metrics endpoint stopped");
            }
        });

        register_metrics();
        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
        Ok(())
    }

    /// Whether this server installed the exporter.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` unless this server installed the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register descriptions of the runtime-level metrics.
fn register_metrics() {
    describe_counter!(
        "lottery_transactions_total",
        "Transactions by outcome (committed, rolled_back, commit_failed, savepoint_rolled_back)"
    );
    describe_counter!(
        "lottery_scheduler_runs_total",
        "Scheduled job runs by job and outcome"
    );
    describe_counter!(
        "lottery_retries_exhausted_total",
        "Operations that failed after exhausting their retry policy"
    );
    describe_counter!(
        "lottery_events_consumed_total",
        "Messages processed by consumers, by consumer and outcome"
    );
}
