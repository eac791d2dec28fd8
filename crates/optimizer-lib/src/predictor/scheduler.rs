//! Background training loop
//!
//! Periodically pulls the newest samples from the store, retrains the
//! predictor and recomputes baselines. A failed cycle is logged and the loop
//! waits for the next tick.

use super::Predictor;
use crate::baseline::BaselineTracker;
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use crate::store::SampleStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval_at;
use tracing::info;

/// Default training interval (30 minutes)
pub const DEFAULT_TRAINING_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Outcome of one training cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub endpoints_trained: usize,
    pub baselines: usize,
    pub duration_ms: u64,
    pub completed_at_ms: i64,
}

/// Periodically retrains the predictor and baseline tracker
pub struct TrainingScheduler {
    store: Arc<SampleStore>,
    predictor: Arc<dyn Predictor>,
    baselines: Arc<BaselineTracker>,
    interval: Duration,
    sample_limit: usize,
    metrics: OptimizerMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
    last_report: RwLock<Option<TrainingReport>>,
}

impl TrainingScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<SampleStore>,
        predictor: Arc<dyn Predictor>,
        baselines: Arc<BaselineTracker>,
        interval: Duration,
        sample_limit: usize,
        metrics: OptimizerMetrics,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Self {
        Self {
            store,
            predictor,
            baselines,
            interval,
            sample_limit,
            metrics,
            logger,
            health,
            last_report: RwLock::new(None),
        }
    }

    /// Train once from the newest `sample_limit` samples
    pub fn run_cycle(&self) -> Result<TrainingReport> {
        let start = Instant::now();
        let samples = self.store.recent(self.sample_limit);

        let endpoints_trained = self.predictor.train(&samples)?;
        let baselines = self.baselines.recompute(&samples)?;

        Ok(TrainingReport {
            samples: samples.len(),
            endpoints_trained,
            baselines,
            duration_ms: start.elapsed().as_millis() as u64,
            completed_at_ms: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Run a cycle and record its outcome in logs, metrics and health
    pub async fn tick(&self) {
        match self.run_cycle() {
            Ok(report) => {
                self.metrics.inc_training_runs();
                self.logger.log_training(&report);
                self.health.set_healthy(components::TRAINER).await;
                *self.last_report.write().await = Some(report);
            }
            Err(e) => {
                self.metrics.inc_training_failures();
                self.logger.log_training_failure(&e.to_string());
                self.health
                    .set_degraded(components::TRAINER, format!("training failed: {}", e))
                    .await;
            }
        }
    }

    /// Train on every tick until shutdown is signalled
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            sample_limit = self.sample_limit,
            "Starting training scheduler"
        );

        let mut ticker = interval_at(tokio::time::Instant::now() + self.interval, self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("Shutting down training scheduler");
                    break;
                }
            }
        }
    }

    pub async fn last_report(&self) -> Option<TrainingReport> {
        self.last_report.read().await.clone()
    }
}
