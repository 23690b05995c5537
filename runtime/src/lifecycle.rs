//! Process lifecycle: task supervision, shutdown, and cleanup.
//!
//! A [`Lifecycle`] is constructed by the binary's `main` and passed to the
//! components it wires. Components:
//!
//! - register cleanup callbacks (close the pool, drop connections) with
//!   [`Lifecycle::on_shutdown`]
//! - spawn their long-running loops with [`Lifecycle::spawn`]
//! - observe shutdown through [`Lifecycle::subscribe_shutdown`]
//!
//! [`Lifecycle::run_until`] then blocks until either the external signal fires
//! or one task stops on its own:
//!
//! 1. Broadcast shutdown to every loop
//! 2. Wait for tasks to finish their current unit of work (bounded by a timeout)
//! 3. Run every cleanup callback concurrently, once, logging failures
//! 4. Return the error of the task that stopped first, if any
//!
//! # Example
//!
//! ```rust,ignore
//! let lifecycle = Lifecycle::new(Duration::from_secs(10));
//! let pool = connect(&settings).await?;
//! let closing = pool.clone();
//! lifecycle.on_shutdown("postgres", move || Box::pin(async move {
//!     closing.close().await;
//!     Ok(())
//! }));
//! lifecycle.spawn("draw-activation", async move { scheduler.run(rx, action).await });
//! lifecycle.run_until(shutdown_signal()).await?;
//! ```

use futures::future::{BoxFuture, join_all};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Boxed error returned by cleanup callbacks.
pub type CleanupError = Box<dyn std::error::Error + Send + Sync>;

type Cleanup = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), CleanupError>> + Send>;

/// Reason the process stopped abnormally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// A supervised task returned an error before shutdown was requested
    #[error("Task '{task}' failed: {reason}")]
    TaskFailed {
        /// Task name
        task: String,
        /// Error reported by the task
        reason: String,
    },

    /// A supervised task panicked
    #[error("Task '{0}' panicked")]
    TaskPanicked(String),
}

/// Explicitly owned process lifecycle.
pub struct Lifecycle {
    shutdown_tx: broadcast::Sender<()>,
    cleanups: Mutex<Vec<(String, Cleanup)>>,
    tasks: Mutex<JoinSet<(String, Result<(), String>)>>,
    drain_timeout: Duration,
}

impl Lifecycle {
    /// Create a lifecycle whose tasks get `drain_timeout` to stop after
    /// shutdown is broadcast.
    #[must_use]
    pub fn new(drain_timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            cleanups: Mutex::new(Vec::new()),
            tasks: Mutex::new(JoinSet::new()),
            drain_timeout,
        }
    }

    /// Receiver that fires once when shutdown starts.
    #[must_use]
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Register a cleanup callback, run once during shutdown.
    pub fn on_shutdown<F>(&self, name: impl Into<String>, cleanup: F)
    where
        F: FnOnce() -> BoxFuture<'static, Result<(), CleanupError>> + Send + 'static,
    {
        self.cleanups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.into(), Box::new(cleanup)));
    }

    /// Spawn a supervised task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, E>(&self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let name = name.into();
        info!(task = %name, "Starting task");
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(async move {
                let result = task.await.map_err(|e| e.to_string());
                (name, result)
            });
    }

    /// Broadcast shutdown without waiting.
    pub fn trigger_shutdown(&self) {
        // No receivers simply means nothing is listening yet.
        let _ = self.shutdown_tx.send(());
    }

    /// Wait for `signal` or the first task to stop, then shut everything down.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] describing the task that stopped first when
    /// that happened before `signal` fired. Cleanup failures are only logged.
    pub async fn run_until<S>(self, signal: S) -> Result<(), LifecycleError>
    where
        S: Future<Output = ()> + Send,
    {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let mut failure = None;

        if tasks.is_empty() {
            signal.await;
            info!("Shutdown signal received");
        } else {
            tokio::select! {
                () = signal => info!("Shutdown signal received"),
                Some(joined) = tasks.join_next() => {
                    failure = Some(Self::report(joined));
                }
            }
        }

        self.trigger_shutdown();
        self.drain(&mut tasks).await;
        self.close().await;

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn report(joined: Result<(String, Result<(), String>), tokio::task::JoinError>) -> LifecycleError {
        match joined {
            Ok((task, Ok(()))) => {
                warn!(task = %task, "Task exited before shutdown");
                LifecycleError::TaskFailed {
                    task,
                    reason: "exited unexpectedly".to_string(),
                }
            }
            Ok((task, Err(reason))) => {
                error!(task = %task, error = %reason, "Task failed, shutting down");
                LifecycleError::TaskFailed { task, reason }
            }
            Err(e) => {
                error!(error = %e, "Task panicked, shutting down");
                LifecycleError::TaskPanicked(e.to_string())
            }
        }
    }

    async fn drain(&self, tasks: &mut JoinSet<(String, Result<(), String>)>) {
        let draining = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((task, Ok(()))) => info!(task = %task, "Task stopped"),
                    Ok((task, Err(reason))) => info!(task = %task, reason = %reason, "Task stopped"),
                    Err(e) => warn!(error = %e, "Task panicked during shutdown"),
                }
            }
        };

        if tokio::time::timeout(self.drain_timeout, draining).await.is_err() {
            warn!(timeout = ?self.drain_timeout, "Tasks did not stop in time, aborting");
            tasks.abort_all();
        }
    }

    /// Run every registered cleanup concurrently. Callbacks run at most once.
    pub async fn close(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.lock().unwrap_or_else(PoisonError::into_inner));
        let runs = cleanups.into_iter().map(|(name, cleanup)| async move {
            match cleanup().await {
                Ok(()) => info!(resource = %name, "Closed"),
                Err(e) => error!(resource = %name, error = %e, "Failed to close"),
            }
        });
        join_all(runs).await;
    }
}

/// Resolves on Ctrl+C or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
