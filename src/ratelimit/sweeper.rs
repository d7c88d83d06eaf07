//! Periodic cleanup of expired rate limit entries.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::limiter::RateLimiter;
use crate::error::{Result, TurnstileError};

/// Default time between cleanup sweeps.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Handle to a background task that calls [`RateLimiter::cleanup`] on a fixed interval.
///
/// Dropping the handle stops the task; [`CleanupSweeper::shutdown`] stops it
/// and waits for it to finish.
#[derive(Debug)]
pub struct CleanupSweeper {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CleanupSweeper {
    /// Spawn the sweep task on the current tokio runtime.
    pub fn spawn(limiter: Arc<RateLimiter>, every: Duration) -> Result<Self> {
        if every.is_zero() {
            return Err(TurnstileError::Config(
                "cleanup interval must be greater than zero".to_string(),
            ));
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        info!(interval_secs = every.as_secs_f64(), "Starting cleanup sweeper");

        let task = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = limiter.cleanup();
                        debug!(
                            removed = removed,
                            remaining = limiter.len(),
                            "Swept expired rate limit entries"
                        );
                    }
                    _ = &mut shutdown_rx => break,
                }
            }

            debug!("Cleanup sweeper stopped");
        });

        Ok(Self {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        info!("Cleanup sweeper shut down");
    }
}

impl Drop for CleanupSweeper {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
