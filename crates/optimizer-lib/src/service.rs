//! Optimizer service: component wiring and background task lifecycle

use crate::allocator::{
    AllocationReward, AllocatorConfig, AllocatorStats, ResourceAllocator, ResourceProbe,
    StaticResources,
};
use crate::anomaly::{AnomalyAlert, AnomalyDetector, DetectorConfig};
use crate::balancer::{AdaptiveLoadBalancer, EndpointHealth};
use crate::baseline::{Baseline, BaselineTracker};
use crate::config::{FeatureFlags, OptimizerConfig};
use crate::error::{OptimizerError, Result};
use crate::health::{components, HealthRegistry};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use crate::pipeline::{Components, OptimizerStage};
use crate::predictor::{
    PerformancePredictor, PredictorConfig, PredictorStats, TrainingReport, TrainingScheduler,
};
use crate::query::{QueryLearnerConfig, QueryPattern, QueryPatternLearner};
use crate::store::{RetentionSweeper, SampleStore, StoreConfig, StoreStats, LOAD_WINDOW};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Builder for [`OptimizerService`] with optional host seams
pub struct OptimizerServiceBuilder {
    config: OptimizerConfig,
    instance: String,
    probe: Option<Arc<dyn ResourceProbe>>,
    reward: Option<Arc<dyn AllocationReward>>,
}

impl OptimizerServiceBuilder {
    /// Name attached to every structured log record
    pub fn instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = instance.into();
        self
    }

    pub fn resource_probe(mut self, probe: Arc<dyn ResourceProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn reward(mut self, reward: Arc<dyn AllocationReward>) -> Self {
        self.reward = Some(reward);
        self
    }

    /// Validate the configuration and construct every component
    pub fn build(self) -> Result<OptimizerService> {
        self.config.validate()?;
        let config = self.config;

        let metrics = OptimizerMetrics::new();
        let logger = StructuredLogger::new(self.instance);

        let store = Arc::new(SampleStore::new(StoreConfig {
            retention: config.retention(),
            max_size: config.max_samples,
        }));
        let baselines = Arc::new(BaselineTracker::new());
        let predictor = Arc::new(PerformancePredictor::new(PredictorConfig::from(&config)));
        let detector = Arc::new(AnomalyDetector::new(
            DetectorConfig::from(&config),
            baselines.clone(),
        ));
        let allocator = Arc::new(ResourceAllocator::new(AllocatorConfig::from(&config)));
        let probe = self
            .probe
            .unwrap_or_else(|| Arc::new(StaticResources::from(&config)));
        let queries = Arc::new(QueryPatternLearner::new(QueryLearnerConfig::from(&config)));
        let balancer = Arc::new(AdaptiveLoadBalancer::from_config(&config));
        let health = HealthRegistry::new();

        let scheduler = Arc::new(TrainingScheduler::new(
            store.clone(),
            predictor.clone(),
            baselines.clone(),
            config.training_interval(),
            config.training_sample_limit,
            metrics.clone(),
            logger.clone(),
            health.clone(),
        ));

        let components = Arc::new(Components {
            config,
            store,
            predictor,
            detector,
            allocator,
            probe,
            reward: self.reward,
            queries,
            balancer,
            metrics,
            logger,
        });

        let (shutdown, _) = broadcast::channel(1);

        Ok(OptimizerService {
            components,
            baselines,
            scheduler,
            health,
            shutdown,
            tasks: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle::Created),
        })
    }
}

/// Snapshot of optimizer state for introspection
#[derive(Debug, Clone, Serialize)]
pub struct OptimizerStats {
    pub version: &'static str,
    pub enabled: bool,
    pub features: FeatureFlags,
    pub store: StoreStats,
    /// Requests observed in the trailing load window
    pub current_load: usize,
    /// Observed requests per second over the configured throughput target
    pub throughput_utilization: f64,
    pub predictor: PredictorStats,
    pub allocator: AllocatorStats,
    pub baselines: usize,
    pub alerts_total: u64,
    pub query_patterns: usize,
    pub tracked_endpoints: usize,
    pub last_training: Option<TrainingReport>,
}

/// Endpoint counters with the derived health score
#[derive(Debug, Clone, Serialize)]
pub struct EndpointScore {
    #[serde(flatten)]
    pub health: EndpointHealth,
    pub health_score: f64,
}

/// Owns every optimizer component and its background tasks
pub struct OptimizerService {
    components: Arc<Components>,
    baselines: Arc<BaselineTracker>,
    scheduler: Arc<TrainingScheduler>,
    health: HealthRegistry,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl OptimizerService {
    pub fn builder(config: OptimizerConfig) -> OptimizerServiceBuilder {
        OptimizerServiceBuilder {
            config,
            instance: "optimizer".to_string(),
            probe: None,
            reward: None,
        }
    }

    pub fn new(config: OptimizerConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Spawn the training scheduler and the retention sweeper
    ///
    /// Calling `start` on a running service is a no-op. A stopped service
    /// cannot be restarted.
    pub async fn start(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        match *lifecycle {
            Lifecycle::Running => return Ok(()),
            Lifecycle::Stopped => return Err(OptimizerError::ServiceStopped),
            Lifecycle::Created => {}
        }

        self.health.register_all().await;

        let c = &self.components;
        let mut tasks = self.tasks.lock().await;
        if c.config.enabled {
            tasks.push(tokio::spawn(
                self.scheduler.clone().run(self.shutdown.subscribe()),
            ));
            let sweeper = RetentionSweeper::new(
                c.store.clone(),
                c.config.sweep_interval(),
                c.metrics.clone(),
            );
            tasks.push(tokio::spawn(sweeper.run(self.shutdown.subscribe())));
        } else {
            info!("Optimizer disabled, background tasks not started");
        }

        self.health.set_ready(true).await;
        c.logger
            .log_startup(VERSION, c.config.training_interval().as_secs());
        *lifecycle = Lifecycle::Running;
        Ok(())
    }

    /// Signal background tasks and wait for them to finish
    pub async fn stop(&self) -> Result<()> {
        let mut lifecycle = self.lifecycle.lock().await;
        if *lifecycle == Lifecycle::Stopped {
            return Err(OptimizerError::ServiceStopped);
        }

        self.health.set_ready(false).await;
        // No receivers when the service was never started
        let _ = self.shutdown.send(());

        let handles: Vec<_> = self.tasks.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        self.components.logger.log_shutdown("stop requested");
        *lifecycle = Lifecycle::Stopped;
        Ok(())
    }

    /// Handle for running requests through the optimizer
    pub fn stage(&self) -> OptimizerStage {
        OptimizerStage::new(self.components.clone())
    }

    /// Run one training cycle immediately
    pub async fn train_now(&self) -> Option<TrainingReport> {
        self.scheduler.tick().await;
        self.scheduler.last_report().await
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.components.config
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn metrics(&self) -> &OptimizerMetrics {
        &self.components.metrics
    }

    pub async fn stats(&self) -> OptimizerStats {
        let c = &self.components;
        let current_load = c.store.current_load();
        let observed_rps = current_load as f64 / LOAD_WINDOW.as_secs_f64();

        OptimizerStats {
            version: VERSION,
            enabled: c.config.enabled,
            features: c.config.features.clone(),
            store: c.store.stats(),
            current_load,
            throughput_utilization: observed_rps / c.config.thresholds.throughput_target_rps,
            predictor: c.predictor.stats(),
            allocator: c.allocator.stats(),
            baselines: self.baselines.len(),
            alerts_total: c.detector.history().total_raised(),
            query_patterns: c.queries.len(),
            tracked_endpoints: c.balancer.len(),
            last_training: self.scheduler.last_report().await,
        }
    }

    /// Current trained baselines, sorted by endpoint
    pub fn baselines(&self) -> Vec<Baseline> {
        let mut all: Vec<Baseline> = self.baselines.snapshot().values().cloned().collect();
        all.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        all
    }

    /// The newest `limit` alerts, oldest first
    pub fn recent_alerts(&self, limit: usize) -> Vec<AnomalyAlert> {
        self.components.detector.history().recent(limit)
    }

    pub fn query_suggestions(&self) -> BTreeMap<String, QueryPattern> {
        self.components.queries.get_optimization_suggestions()
    }

    pub fn endpoint_health(&self) -> Vec<EndpointScore> {
        self.components
            .balancer
            .snapshot()
            .into_iter()
            .map(|health| EndpointScore {
                health_score: health.score(),
                health,
            })
            .collect()
    }

    /// Mark the request-path components unhealthy, e.g. from a host watchdog
    pub async fn report_component_failure(&self, component: &str, reason: &str) {
        if components::ALL.contains(&component) {
            self.health.set_unhealthy(component, reason).await;
        } else {
            warn!(component = %component, "Unknown health component");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::ComponentStatus;

    #[test]
    fn test_invalid_config_fails_fast() {
        let mut config = OptimizerConfig::default();
        config.tuning.epsilon = 1.5;
        assert!(matches!(
            OptimizerService::new(config),
            Err(OptimizerError::InvalidConfig { field: "tuning.epsilon", .. })
        ));
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
        assert!(!service.health().readiness().await.ready);

        service.start().await.unwrap();
        service.start().await.unwrap();
        assert!(service.health().readiness().await.ready);
        assert_eq!(
            service.health().health().await.status,
            ComponentStatus::Healthy
        );

        service.stop().await.unwrap();
        assert!(!service.health().readiness().await.ready);
        assert!(matches!(service.start().await, Err(OptimizerError::ServiceStopped)));
        assert!(matches!(service.stop().await, Err(OptimizerError::ServiceStopped)));
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stats_on_empty_service() {
        let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
        let stats = service.stats().await;
        assert_eq!(stats.store.entries, 0);
        assert_eq!(stats.baselines, 0);
        assert!(stats.last_training.is_none());
        assert!(service.baselines().is_empty());
        assert!(service.recent_alerts(10).is_empty());
    }

    #[tokio::test]
    async fn test_report_component_failure() {
        let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
        service.start().await.unwrap();
        service
            .report_component_failure(components::ALLOCATOR, "probe unavailable")
            .await;
        assert_eq!(
            service.health().health().await.status,
            ComponentStatus::Unhealthy
        );
        assert!(!service.health().readiness().await.ready);
        service.stop().await.unwrap();
    }
}
