//! Recurring job scheduler.
//!
//! A [`Scheduler`] runs its action once immediately, then again each time
//! `interval` elapses after the previous run completed. It stops on:
//!
//! - an action error (after the [`RetryPolicy`] gives up) → `Err`
//! - the shutdown signal → `Ok(())`
//!
//! Shutdown is only observed while waiting for the next tick, so a run that
//! has started always finishes its unit of work.
//!
//! ```rust,ignore
//! let scheduler = Scheduler::new("draw-activation", Duration::from_secs(3600))
//!     .with_retry_policy(policy);
//! scheduler
//!     .run(shutdown_rx, || async { lifecycle.activate_draws().await.map(|_| ()) })
//!     .await?;
//! ```

use crate::retry::{RetryPolicy, retry_with_backoff};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Runs one periodic job.
#[derive(Debug, Clone)]
pub struct Scheduler {
    name: String,
    interval: Duration,
    retry: RetryPolicy,
}

impl Scheduler {
    /// Create a scheduler that stops on the first error.
    #[must_use]
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            interval,
            retry: RetryPolicy::none(),
        }
    }

    /// Retry failing runs according to `policy` before giving up.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Job name used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tick interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `action` now and then on every tick until shutdown or failure.
    ///
    /// # Errors
    ///
    /// Returns the first error `action` produces once retries are exhausted.
    /// The loop does not continue after an error.
    pub async fn run<F, Fut, E>(&self, mut shutdown: broadcast::Receiver<()>, mut action: F) -> Result<(), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        info!(job = %self.name, interval = ?self.interval, "Scheduler started");
        self.run_once(&mut action).await?;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(job = %self.name, "Scheduler received shutdown signal");
                    return Ok(());
                }
                () = tokio::time::sleep(self.interval) => {
                    self.run_once(&mut action).await?;
                }
            }
        }
    }

    async fn run_once<F, Fut, E>(&self, action: &mut F) -> Result<(), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: Display,
    {
        debug!(job = %self.name, "Running scheduled job");
        match retry_with_backoff(&self.retry, || action()).await {
            Ok(()) => {
                metrics::counter!("lottery_scheduler_runs_total", "job" => self.name.clone(), "outcome" => "success")
                    .increment(1);
                Ok(())
            }
            Err(e) => {
                metrics::counter!("lottery_scheduler_runs_total", "job" => self.name.clone(), "outcome" => "failure")
                    .increment(1);
                error!(job = %self.name, error = %e, "Scheduled job failed, stopping");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_action(
        counter: Arc<AtomicUsize>,
        fail_on: Option<usize>,
    ) -> impl FnMut() -> std::future::Ready<Result<(), String>> {
        move || {
            let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(run) == fail_on {
                std::future::ready(Err(format!("run {run} failed")))
            } else {
                std::future::ready(Ok(()))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_run_error_is_returned_without_looping() {
        let (_tx, rx) = broadcast::channel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new("job", Duration::from_secs(60));

        let result = scheduler.run(rx, counting_action(Arc::clone(&counter), Some(1))).await;

        assert_eq!(result, Err("run 1 failed".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn later_tick_error_stops_the_loop() {
        let (_tx, rx) = broadcast::channel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new("job", Duration::from_secs(60));

        let result = scheduler.run(rx, counting_action(Arc::clone(&counter), Some(3))).await;

        assert_eq!(result, Err("run 3 failed".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_ok() {
        let (tx, rx) = broadcast::channel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let scheduler = Scheduler::new("job", Duration::from_secs(60));
        let action = counting_action(Arc::clone(&counter), None);

        let handle = tokio::spawn(async move { scheduler.run(rx, action).await });
        tokio::time::sleep(Duration::from_secs(150)).await;
        let _ = tx.send(());

        let result = handle.await.unwrap_or_else(|e| Err(e.to_string()));
        assert_eq!(result, Ok(()));
        // immediate run + ticks at 60s and 120s
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_policy_keeps_job_alive() {
        let (_tx, rx) = broadcast::channel(1);
        let counter = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::builder()
            .max_retries(1)
            .initial_delay(Duration::from_secs(1))
            .build();
        let scheduler = Scheduler::new("job", Duration::from_secs(60)).with_retry_policy(policy);

        // run 2 fails and is retried as run 3; runs 5 and 6 both fail
        let counter_in = Arc::clone(&counter);
        let result = scheduler
            .run(rx, move || {
                let run = counter_in.fetch_add(1, Ordering::SeqCst) + 1;
                std::future::ready(if run == 2 || run >= 5 {
                    Err(format!("run {run} failed"))
                } else {
                    Ok(())
                })
            })
            .await;

        assert_eq!(result, Err("run 6 failed".to_string()));
        assert_eq!(counter.load(Ordering::SeqCst), 6);
    }
}
