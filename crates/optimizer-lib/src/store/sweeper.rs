//! Periodic retention sweep

use super::buffer::{now_ms, SampleStore};
use crate::observability::OptimizerMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant};
use tracing::{debug, info};

/// Background task that discards samples past the retention horizon
pub struct RetentionSweeper {
    store: Arc<SampleStore>,
    period: Duration,
    metrics: OptimizerMetrics,
}

impl RetentionSweeper {
    pub fn new(store: Arc<SampleStore>, period: Duration, metrics: OptimizerMetrics) -> Self {
        Self {
            store,
            period,
            metrics,
        }
    }

    /// Run one sweep against the current wall clock
    pub fn sweep_once(&self) -> usize {
        let removed = self.store.sweep(now_ms());
        self.metrics.add_swept_samples(removed as u64);
        self.metrics.set_samples_stored(self.store.len() as i64);
        removed
    }

    /// Sweep on every tick until shutdown is signalled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.period.as_secs(),
            "Starting sample retention sweeper"
        );

        let mut ticker = interval_at(Instant::now() + self.period, self.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep_once();
                    debug!(
                        removed = removed,
                        remaining = self.store.len(),
                        "Retention sweep complete"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down sample retention sweeper");
                    break;
                }
            }
        }
    }
}
