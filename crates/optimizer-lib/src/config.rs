//! Optimizer configuration
//!
//! Every field has a documented default so a host can deserialize an empty
//! document. [`OptimizerConfig::validate`] rejects out-of-range values before
//! any component is built.

use crate::error::{OptimizerError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Master switch; when false the stage only forwards to the handler
    pub enabled: bool,
    /// Period of the background training cycle
    pub training_interval_minutes: u64,
    /// Number of most recent samples pulled for each training cycle
    pub training_sample_limit: usize,
    /// Minimum prediction confidence before an optimization is advertised
    pub prediction_confidence_threshold: f64,
    /// Raw samples older than this are discarded by the sweeper
    pub metrics_retention_hours: u64,
    /// Period of the retention sweep
    pub sweep_interval_secs: u64,
    /// Hard cap on stored samples, oldest evicted first
    pub max_samples: usize,
    pub features: FeatureFlags,
    pub thresholds: OptimizationThresholds,
    pub tuning: TuningConfig,
    pub resources: ResourceConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            training_interval_minutes: 30,
            training_sample_limit: 10_000,
            prediction_confidence_threshold: 0.7,
            metrics_retention_hours: 24,
            sweep_interval_secs: 60 * 60,
            max_samples: 100_000,
            features: FeatureFlags::default(),
            thresholds: OptimizationThresholds::default(),
            tuning: TuningConfig::default(),
            resources: ResourceConfig::default(),
        }
    }
}

/// Per-feature switches
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub performance_prediction: bool,
    pub resource_allocation: bool,
    pub anomaly_detection: bool,
    pub query_optimization: bool,
    pub load_balancing: bool,
    pub auto_scaling: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            performance_prediction: true,
            resource_allocation: true,
            anomaly_detection: true,
            query_optimization: true,
            load_balancing: true,
            auto_scaling: true,
        }
    }
}

/// Operator-facing optimization targets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationThresholds {
    /// Forecasts above this are candidates for caching
    pub target_latency_ms: f64,
    /// Memory delta ceiling per request
    pub max_memory_bytes: u64,
    /// CPU time as a percentage of wall time
    pub cpu_threshold_percent: f64,
    pub throughput_target_rps: f64,
}

impl Default for OptimizationThresholds {
    fn default() -> Self {
        Self {
            target_latency_ms: 100.0,
            max_memory_bytes: 512 * 1024 * 1024,
            cpu_threshold_percent: 80.0,
            throughput_target_rps: 1000.0,
        }
    }
}

/// Learning and scoring constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub smoothing_alpha: f64,
    pub min_prediction_samples: usize,
    pub default_prediction_ms: f64,
    pub default_confidence: f64,
    /// Variance at which prediction confidence reaches zero
    pub confidence_variance_scale: f64,
    pub z_score_high: f64,
    pub z_score_critical: f64,
    /// Server errors per window above which an error-rate alert fires
    pub error_burst_threshold: usize,
    pub error_window_secs: u64,
    pub epsilon: f64,
    pub learning_rate: f64,
    pub discount_factor: f64,
    pub balancer_alpha: f64,
    pub load_threshold_medium: f64,
    pub load_threshold_high: f64,
    pub memory_threshold_low_mb: f64,
    pub memory_threshold_high_mb: f64,
    /// Share of available resources granted before multipliers
    pub base_allocation_fraction: f64,
    pub slow_query_ms: f64,
    pub slow_query_min_count: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.3,
            min_prediction_samples: 10,
            default_prediction_ms: 50.0,
            default_confidence: 0.3,
            confidence_variance_scale: 1000.0,
            z_score_high: 3.0,
            z_score_critical: 5.0,
            error_burst_threshold: 10,
            error_window_secs: 60,
            epsilon: 0.1,
            learning_rate: 0.1,
            discount_factor: 0.9,
            balancer_alpha: 0.2,
            load_threshold_medium: 50.0,
            load_threshold_high: 80.0,
            memory_threshold_low_mb: 1000.0,
            memory_threshold_high_mb: 5000.0,
            base_allocation_fraction: 0.1,
            slow_query_ms: 100.0,
            slow_query_min_count: 10,
        }
    }
}

/// Static resource capacity used by the default resource probe
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    pub available_memory_mb: f64,
    pub available_cpu_units: f64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            available_memory_mb: 4096.0,
            available_cpu_units: 4.0,
        }
    }
}

impl OptimizerConfig {
    pub fn training_interval(&self) -> Duration {
        Duration::from_secs(self.training_interval_minutes * 60)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.metrics_retention_hours * 60 * 60)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Check every field for a usable value
    pub fn validate(&self) -> Result<()> {
        if self.training_interval_minutes == 0 {
            return Err(OptimizerError::invalid("training_interval_minutes", "must be > 0"));
        }
        if self.training_sample_limit == 0 {
            return Err(OptimizerError::invalid("training_sample_limit", "must be > 0"));
        }
        unit_interval("prediction_confidence_threshold", self.prediction_confidence_threshold)?;
        if self.metrics_retention_hours == 0 {
            return Err(OptimizerError::invalid("metrics_retention_hours", "must be > 0"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(OptimizerError::invalid("sweep_interval_secs", "must be > 0"));
        }
        if self.max_samples == 0 {
            return Err(OptimizerError::invalid("max_samples", "must be > 0"));
        }

        let th = &self.thresholds;
        positive("thresholds.target_latency_ms", th.target_latency_ms)?;
        if th.max_memory_bytes == 0 {
            return Err(OptimizerError::invalid("thresholds.max_memory_bytes", "must be > 0"));
        }
        positive("thresholds.cpu_threshold_percent", th.cpu_threshold_percent)?;
        positive("thresholds.throughput_target_rps", th.throughput_target_rps)?;

        let t = &self.tuning;
        if !(t.smoothing_alpha > 0.0 && t.smoothing_alpha <= 1.0) {
            return Err(OptimizerError::invalid("tuning.smoothing_alpha", "must be in (0, 1]"));
        }
        if t.min_prediction_samples == 0 {
            return Err(OptimizerError::invalid("tuning.min_prediction_samples", "must be > 0"));
        }
        positive("tuning.default_prediction_ms", t.default_prediction_ms)?;
        unit_interval("tuning.default_confidence", t.default_confidence)?;
        positive("tuning.confidence_variance_scale", t.confidence_variance_scale)?;
        positive("tuning.z_score_high", t.z_score_high)?;
        if t.z_score_critical <= t.z_score_high {
            return Err(OptimizerError::invalid(
                "tuning.z_score_critical",
                "must exceed tuning.z_score_high",
            ));
        }
        if t.error_window_secs == 0 {
            return Err(OptimizerError::invalid("tuning.error_window_secs", "must be > 0"));
        }
        unit_interval("tuning.epsilon", t.epsilon)?;
        if !(t.learning_rate > 0.0 && t.learning_rate <= 1.0) {
            return Err(OptimizerError::invalid("tuning.learning_rate", "must be in (0, 1]"));
        }
        unit_interval("tuning.discount_factor", t.discount_factor)?;
        if !(t.balancer_alpha > 0.0 && t.balancer_alpha <= 1.0) {
            return Err(OptimizerError::invalid("tuning.balancer_alpha", "must be in (0, 1]"));
        }
        if t.load_threshold_medium >= t.load_threshold_high {
            return Err(OptimizerError::invalid(
                "tuning.load_threshold_medium",
                "must be below tuning.load_threshold_high",
            ));
        }
        if t.memory_threshold_low_mb >= t.memory_threshold_high_mb {
            return Err(OptimizerError::invalid(
                "tuning.memory_threshold_low_mb",
                "must be below tuning.memory_threshold_high_mb",
            ));
        }
        if !(t.base_allocation_fraction > 0.0 && t.base_allocation_fraction <= 1.0) {
            return Err(OptimizerError::invalid(
                "tuning.base_allocation_fraction",
                "must be in (0, 1]",
            ));
        }
        positive("tuning.slow_query_ms", t.slow_query_ms)?;

        positive("resources.available_memory_mb", self.resources.available_memory_mb)?;
        positive("resources.available_cpu_units", self.resources.available_cpu_units)?;
        Ok(())
    }
}

fn positive(field: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(OptimizerError::invalid(field, format!("must be > 0, got {}", value)))
    }
}

fn unit_interval(field: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(OptimizerError::invalid(field, format!("must be in [0, 1], got {}", value)))
    }
}
