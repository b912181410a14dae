//! Periodic health monitoring.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use super::aggregator::HealthAggregator;
use crate::task::CancellationToken;

/// Background task running a health scan on a fixed interval.
///
/// The first scan runs immediately.
pub struct Monitor {
    handle: JoinHandle<()>,
    stop: CancellationToken,
    interval: Duration,
}

impl Monitor {
    /// Start monitoring.
    ///
    /// # Panics
    ///
    /// Panics if `interval` is zero; callers validate it first.
    pub fn start(aggregator: Arc<HealthAggregator>, interval: Duration) -> Self {
        let stop = CancellationToken::new();
        let stop_signal = stop.clone();

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "health monitor started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_signal.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let report = aggregator.scan().await;
                if !report.degraded.is_empty() {
                    warn!(degraded = ?report.degraded, "health monitor scan degraded");
                }
            }

            info!("health monitor stopped");
        });

        Self {
            handle,
            stop,
            interval,
        }
    }

    /// The scan interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Signal the monitor to stop after the scan in flight, if any.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// Check if the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stop the monitor and wait for it to exit.
    pub async fn join(self) {
        self.stop();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "health monitor task panicked");
        }
    }
}
