//! Observability infrastructure for the optimizer
//!
//! Provides:
//! - Prometheus metrics (stage overhead, handler latency, samples, anomalies, training)
//! - Structured JSON-friendly logging with tracing

use crate::anomaly::{AlertSeverity, AnomalyAlert};
use crate::predictor::TrainingReport;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for the optimizer's own per-request overhead (seconds)
const OVERHEAD_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01,
];

/// Histogram buckets for downstream handler latency (seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<OptimizerMetricsInner> = OnceLock::new();

struct OptimizerMetricsInner {
    stage_overhead_seconds: Histogram,
    handler_duration_seconds: Histogram,
    samples_stored: IntGauge,
    predictions_total: IntCounter,
    anomalies_total: IntCounterVec,
    allocations_total: IntCounterVec,
    training_runs_total: IntCounter,
    training_failures_total: IntCounter,
    swept_samples_total: IntCounter,
}

impl OptimizerMetricsInner {
    fn new() -> Self {
        Self {
            stage_overhead_seconds: register_histogram!(
                "optimizer_stage_overhead_seconds",
                "Time spent in the optimizer stage excluding the downstream handler",
                OVERHEAD_BUCKETS.to_vec()
            )
            .expect("Failed to register stage_overhead_seconds"),

            handler_duration_seconds: register_histogram!(
                "optimizer_handler_duration_seconds",
                "Observed downstream handler duration",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register handler_duration_seconds"),

            samples_stored: register_int_gauge!(
                "optimizer_samples_stored",
                "Number of request samples currently held in the sample store"
            )
            .expect("Failed to register samples_stored"),

            predictions_total: register_int_counter!(
                "optimizer_predictions_total",
                "Total number of request cost predictions"
            )
            .expect("Failed to register predictions_total"),

            anomalies_total: register_int_counter_vec!(
                "optimizer_anomalies_total",
                "Total number of anomaly alerts raised",
                &["severity"]
            )
            .expect("Failed to register anomalies_total"),

            allocations_total: register_int_counter_vec!(
                "optimizer_allocations_total",
                "Total number of allocation decisions by strategy",
                &["strategy"]
            )
            .expect("Failed to register allocations_total"),

            training_runs_total: register_int_counter!(
                "optimizer_training_runs_total",
                "Total number of completed training cycles"
            )
            .expect("Failed to register training_runs_total"),

            training_failures_total: register_int_counter!(
                "optimizer_training_failures_total",
                "Total number of failed training cycles"
            )
            .expect("Failed to register training_failures_total"),

            swept_samples_total: register_int_counter!(
                "optimizer_swept_samples_total",
                "Total number of samples discarded by the retention sweep"
            )
            .expect("Failed to register swept_samples_total"),
        }
    }
}

/// Optimizer metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct OptimizerMetrics {
    _private: (),
}

impl Default for OptimizerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &OptimizerMetricsInner {
        GLOBAL_METRICS.get_or_init(OptimizerMetricsInner::new)
    }

    pub fn observe_stage_overhead(&self, secs: f64) {
        self.inner().stage_overhead_seconds.observe(secs);
    }

    pub fn observe_handler_duration(&self, secs: f64) {
        self.inner().handler_duration_seconds.observe(secs);
    }

    pub fn set_samples_stored(&self, count: i64) {
        self.inner().samples_stored.set(count);
    }

    pub fn inc_predictions(&self) {
        self.inner().predictions_total.inc();
    }

    pub fn inc_anomalies(&self, severity: AlertSeverity) {
        self.inner()
            .anomalies_total
            .with_label_values(&[severity.as_str()])
            .inc();
    }

    pub fn inc_allocations(&self, strategy: &str) {
        self.inner()
            .allocations_total
            .with_label_values(&[strategy])
            .inc();
    }

    pub fn inc_training_runs(&self) {
        self.inner().training_runs_total.inc();
    }

    pub fn inc_training_failures(&self) {
        self.inner().training_failures_total.inc();
    }

    pub fn add_swept_samples(&self, count: u64) {
        self.inner().swept_samples_total.inc_by(count);
    }
}

/// Structured logger for optimizer events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log an anomaly alert; high and critical alerts are warnings
    pub fn log_anomaly(&self, endpoint: &str, alert: &AnomalyAlert) {
        match alert.severity {
            AlertSeverity::Critical | AlertSeverity::High => {
                warn!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    endpoint = %endpoint,
                    anomaly_type = %alert.kind,
                    severity = %alert.severity,
                    details = %alert.message,
                    suggestion = %alert.suggestion,
                    "Anomaly detected"
                );
            }
            _ => {
                info!(
                    event = "anomaly_detected",
                    instance = %self.instance,
                    endpoint = %endpoint,
                    anomaly_type = %alert.kind,
                    severity = %alert.severity,
                    details = %alert.message,
                    "Anomaly detected"
                );
            }
        }
    }

    pub fn log_training(&self, report: &TrainingReport) {
        info!(
            event = "training_completed",
            instance = %self.instance,
            samples = report.samples,
            endpoints_trained = report.endpoints_trained,
            baselines = report.baselines,
            duration_ms = report.duration_ms,
            "Training cycle completed"
        );
    }

    pub fn log_training_failure(&self, error: &str) {
        warn!(
            event = "training_failed",
            instance = %self.instance,
            error = %error,
            "Training cycle failed, waiting for next cycle"
        );
    }

    pub fn log_slow_query(&self, pattern: &str, avg_ms: f64, count: u64, indexes: &[String]) {
        info!(
            event = "slow_query_pattern",
            instance = %self.instance,
            pattern = %pattern,
            avg_ms = avg_ms,
            count = count,
            suggested_indexes = ?indexes,
            "Slow query pattern observed"
        );
    }

    pub fn log_startup(&self, version: &str, training_interval_secs: u64) {
        info!(
            event = "optimizer_started",
            instance = %self.instance,
            version = %version,
            training_interval_secs = training_interval_secs,
            "Adaptive optimizer started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "optimizer_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Adaptive optimizer shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimizer_metrics_handles_share_registry() {
        let metrics = OptimizerMetrics::new();
        let other = metrics.clone();

        metrics.observe_stage_overhead(0.0001);
        metrics.observe_handler_duration(0.02);
        metrics.set_samples_stored(10);
        metrics.inc_predictions();
        metrics.inc_anomalies(AlertSeverity::High);
        other.inc_allocations("maintain");
        other.inc_training_runs();
        other.add_swept_samples(3);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "optimizer_anomalies_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance, "test-instance");
    }
}
