//! Exponential-smoothing performance predictor
//!
//! Forecasts the duration of an incoming request from the endpoint's recent
//! history and picks a mitigation with a fixed rule list. Confidence is the
//! heuristic `1 - variance / scale`, not a statistical interval.

use super::features::{exponential_smoothing, EndpointHistory};
use super::Predictor;
use crate::config::OptimizerConfig;
use crate::error::Result;
use crate::models::{MetricSample, PredictionResult, RecommendedAction, ResourceEstimate};
use chrono::Timelike;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Working hours (local time, half-open) during which prefetching is preferred
const BUSINESS_HOURS: std::ops::Range<u32> = 9..17;

/// History length above which an endpoint counts as well established
const LARGE_HISTORY: usize = 100;

/// Maximum durations retained per endpoint by training
const MAX_TRAINED_HISTORY: usize = 1_000;

/// Configuration for the predictor
#[derive(Debug, Clone)]
pub struct PredictorConfig {
    pub alpha: f64,
    pub min_samples: usize,
    pub default_duration_ms: f64,
    pub default_confidence: f64,
    pub variance_scale: f64,
    /// Forecasts above this are caching candidates
    pub cache_latency_ms: f64,
    /// Forecasts above this on established endpoints are optimization candidates
    pub optimize_latency_ms: f64,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            min_samples: 10,
            default_duration_ms: 50.0,
            default_confidence: 0.3,
            variance_scale: 1000.0,
            cache_latency_ms: 100.0,
            optimize_latency_ms: 50.0,
        }
    }
}

impl From<&OptimizerConfig> for PredictorConfig {
    fn from(config: &OptimizerConfig) -> Self {
        Self {
            alpha: config.tuning.smoothing_alpha,
            min_samples: config.tuning.min_prediction_samples,
            default_duration_ms: config.tuning.default_prediction_ms,
            default_confidence: config.tuning.default_confidence,
            variance_scale: config.tuning.confidence_variance_scale,
            cache_latency_ms: config.thresholds.target_latency_ms,
            ..Default::default()
        }
    }
}

/// Per-endpoint forecaster
pub struct PerformancePredictor {
    config: PredictorConfig,
    trained: DashMap<String, EndpointHistory>,
    prediction_count: AtomicU64,
    fallback_count: AtomicU64,
}

impl PerformancePredictor {
    pub fn new(config: PredictorConfig) -> Self {
        Self {
            config,
            trained: DashMap::new(),
            prediction_count: AtomicU64::new(0),
            fallback_count: AtomicU64::new(0),
        }
    }

    /// Predict using the current local hour for time-of-day rules
    pub fn predict(&self, endpoint: &str, recent: &[MetricSample]) -> PredictionResult {
        self.predict_at_hour(endpoint, recent, chrono::Local::now().hour())
    }

    /// Predict from `recent` samples for `endpoint`
    ///
    /// When fewer than `min_samples` recent samples are supplied the trained
    /// history for the endpoint is used instead; without either a
    /// low-confidence default is returned.
    pub fn predict_at_hour(&self, endpoint: &str, recent: &[MetricSample], hour: u32) -> PredictionResult {
        self.prediction_count.fetch_add(1, Ordering::Relaxed);

        if recent.len() >= self.config.min_samples {
            return self.forecast(&EndpointHistory::from_samples(recent), hour);
        }
        if let Some(history) = self.trained.get(endpoint) {
            if history.len() >= self.config.min_samples {
                return self.forecast(&history, hour);
            }
        }

        self.fallback_count.fetch_add(1, Ordering::Relaxed);
        self.default_prediction()
    }

    fn default_prediction(&self) -> PredictionResult {
        PredictionResult {
            expected_duration_ms: self.config.default_duration_ms,
            confidence: self.config.default_confidence,
            action: RecommendedAction::Cache,
            resources: ResourceEstimate {
                io_ms: self.config.default_duration_ms / 10.0,
                ..Default::default()
            },
        }
    }

    fn forecast(&self, history: &EndpointHistory, hour: u32) -> PredictionResult {
        let expected = exponential_smoothing(&history.durations, self.config.alpha);
        let confidence = (1.0 - history.variance() / self.config.variance_scale).clamp(0.0, 1.0);

        PredictionResult {
            expected_duration_ms: expected,
            confidence,
            action: self.select_action(expected, history, hour),
            resources: ResourceEstimate {
                memory_bytes: history.avg_memory_bytes,
                cpu_micros: history.avg_cpu_micros,
                io_ms: expected / 10.0,
            },
        }
    }

    fn select_action(&self, expected: f64, history: &EndpointHistory, hour: u32) -> RecommendedAction {
        if expected > 2.0 * history.mean() {
            RecommendedAction::Throttle
        } else if expected > self.config.cache_latency_ms && history.cache_hit_rate < 0.3 {
            RecommendedAction::Cache
        } else if BUSINESS_HOURS.contains(&hour) {
            RecommendedAction::Prefetch
        } else if history.len() > LARGE_HISTORY && expected > self.config.optimize_latency_ms {
            RecommendedAction::Optimize
        } else {
            RecommendedAction::Batch
        }
    }

    /// Number of endpoints with trained history
    pub fn trained_endpoints(&self) -> usize {
        self.trained.len()
    }

    pub fn stats(&self) -> PredictorStats {
        PredictorStats {
            total_predictions: self.prediction_count.load(Ordering::Relaxed),
            fallback_predictions: self.fallback_count.load(Ordering::Relaxed),
            trained_endpoints: self.trained.len(),
        }
    }
}

impl Predictor for PerformancePredictor {
    fn predict(&self, endpoint: &str, recent: &[MetricSample]) -> PredictionResult {
        PerformancePredictor::predict(self, endpoint, recent)
    }

    /// Replace the trained histories with the sequences found in `batch`
    fn train(&self, batch: &[MetricSample]) -> Result<usize> {
        let mut grouped: HashMap<&str, Vec<MetricSample>> = HashMap::new();
        for sample in batch {
            grouped.entry(sample.endpoint.as_str()).or_default().push(sample.clone());
        }

        self.trained.retain(|endpoint, _| grouped.contains_key(endpoint.as_str()));
        for (endpoint, samples) in &grouped {
            let mut history = EndpointHistory::from_samples(samples);
            history.truncate_front(MAX_TRAINED_HISTORY);
            self.trained.insert(endpoint.to_string(), history);
        }
        Ok(grouped.len())
    }
}

impl Default for PerformancePredictor {
    fn default() -> Self {
        Self::new(PredictorConfig::default())
    }
}

/// Predictor counters
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PredictorStats {
    pub total_predictions: u64,
    pub fallback_predictions: u64,
    pub trained_endpoints: usize,
}
