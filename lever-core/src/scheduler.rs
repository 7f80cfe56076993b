//! Periodic sweep trigger.
//!
//! Runs [`Coordinator::sweep`] on a fixed interval in its own task. Ticks
//! that fire while a sweep is still running are dropped, not queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;

/// Handle to a running sweep task
pub struct SweepScheduler {
    handle: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl SweepScheduler {
    /// Spawn the sweep loop. The first sweep runs one `period` after start.
    pub fn spawn(coordinator: Arc<Coordinator>, period: Duration, max_age: Duration) -> Self {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();

        let handle = tokio::spawn(async move {
            // Past chrono's range nothing can be old enough to sweep.
            let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;

            info!(period_secs = period.as_secs(), "Sweep scheduler started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        info!("Sweep scheduler received shutdown signal");
                        break;
                    }
                    _ = interval.tick() => {
                        match coordinator.sweep(max_age).await {
                            Ok(report) if report.skipped => debug!("Sweep tick skipped"),
                            Ok(report) => debug!(
                                candidates = report.candidates,
                                resolved = report.resolved,
                                "Sweep tick"
                            ),
                            Err(e) => warn!(error = %e, "Sweep failed"),
                        }
                    }
                }
            }

            info!("Sweep scheduler stopped");
        });

        Self { handle, shutdown }
    }

    /// Token that stops the loop when cancelled
    pub fn token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Signal the loop to stop after the current sweep
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for the loop to exit
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Sweep task panicked");
        }
    }
}
