//! Per-request anomaly detection
//!
//! Scores a completed request against its endpoint baseline on latency
//! (Z-score), memory, CPU and server-error bursts. Baselines come from the
//! training cycle; endpoints that have not been trained yet get a baseline
//! computed lazily from the sample store.

use super::alerter::{AlertHistory, AlertKind, AlertSeverity, AnomalyAlert};
use crate::baseline::{Baseline, BaselineTracker};
use crate::config::OptimizerConfig;
use crate::models::MetricSample;
use crate::store::SampleStore;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Samples used to build a lazy baseline for an untrained endpoint
const LAZY_BASELINE_WINDOW: usize = 1_000;

/// Age after which a lazily computed baseline is rebuilt
const LAZY_BASELINE_TTL: Duration = Duration::from_secs(60);

/// Lazy baselines over fewer samples are rebuilt on every lookup
const LAZY_BASELINE_MIN_CACHED: usize = 30;

/// Thresholds for anomaly detection
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub z_high: f64,
    pub z_critical: f64,
    pub max_memory_bytes: u64,
    pub cpu_threshold_percent: f64,
    pub error_burst_threshold: usize,
    pub error_window: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            z_high: 3.0,
            z_critical: 5.0,
            max_memory_bytes: 512 * 1024 * 1024,
            cpu_threshold_percent: 80.0,
            error_burst_threshold: 10,
            error_window: Duration::from_secs(60),
        }
    }
}

impl From<&OptimizerConfig> for DetectorConfig {
    fn from(config: &OptimizerConfig) -> Self {
        Self {
            z_high: config.tuning.z_score_high,
            z_critical: config.tuning.z_score_critical,
            max_memory_bytes: config.thresholds.max_memory_bytes,
            cpu_threshold_percent: config.thresholds.cpu_threshold_percent,
            error_burst_threshold: config.tuning.error_burst_threshold,
            error_window: Duration::from_secs(config.tuning.error_window_secs),
        }
    }
}

/// Detects latency, memory, CPU and error-rate anomalies
pub struct AnomalyDetector {
    config: DetectorConfig,
    baselines: Arc<BaselineTracker>,
    lazy_baselines: RwLock<HashMap<String, Baseline>>,
    history: AlertHistory,
}

impl AnomalyDetector {
    pub fn new(config: DetectorConfig, baselines: Arc<BaselineTracker>) -> Self {
        Self {
            config,
            baselines,
            lazy_baselines: RwLock::new(HashMap::new()),
            history: AlertHistory::default(),
        }
    }

    /// Baseline for `endpoint`: trained if available, otherwise lazily built
    ///
    /// Look the baseline up before recording the sample being scored, so the
    /// sample is not part of its own reference distribution. Lazy baselines
    /// are cached only once they cover [`LAZY_BASELINE_MIN_CACHED`] samples.
    pub fn baseline_for(&self, endpoint: &str, store: &SampleStore) -> Option<Baseline> {
        if let Some(baseline) = self.baselines.get(endpoint) {
            return Some(baseline);
        }

        let now = chrono::Utc::now().timestamp_millis();
        {
            let lazy = self
                .lazy_baselines
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(baseline) = lazy.get(endpoint) {
                if now - baseline.computed_at_ms < LAZY_BASELINE_TTL.as_millis() as i64 {
                    return Some(baseline.clone());
                }
            }
        }

        let durations: Vec<f64> = store
            .recent_for(endpoint, LAZY_BASELINE_WINDOW)
            .iter()
            .map(|s| s.duration_ms)
            .collect();
        let baseline = Baseline::from_durations(endpoint, &durations, now)?;
        let mut lazy = self
            .lazy_baselines
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if baseline.sample_count >= LAZY_BASELINE_MIN_CACHED {
            lazy.insert(endpoint.to_string(), baseline.clone());
        } else {
            lazy.remove(endpoint);
        }
        Some(baseline)
    }

    /// Server errors for the sample's endpoint within the error window
    ///
    /// Only counted when `sample` is itself a server error.
    pub fn recent_server_errors(&self, sample: &MetricSample, store: &SampleStore) -> usize {
        if !sample.is_server_error() {
            return 0;
        }
        let since = sample.timestamp_ms - self.config.error_window.as_millis() as i64;
        store.server_errors_since(&sample.endpoint, since)
    }

    /// Score `sample` and record any alerts in the history
    ///
    /// `recent_server_errors` is the number of server errors for the same
    /// endpoint within the error window.
    pub fn detect(
        &self,
        sample: &MetricSample,
        baseline: Option<&Baseline>,
        recent_server_errors: usize,
    ) -> Vec<AnomalyAlert> {
        let mut alerts = Vec::new();

        if let Some(baseline) = baseline {
            let z = baseline.z_score(sample.duration_ms);
            if let Some(severity) = self.latency_severity(z) {
                alerts.push(self.alert(
                    sample,
                    severity,
                    AlertKind::Latency,
                    format!(
                        "Response time {:.1}ms is {:.1} standard deviations from baseline {:.1}ms",
                        sample.duration_ms, z, baseline.mean_ms
                    ),
                    &[
                        ("duration_ms", sample.duration_ms),
                        ("baseline_mean_ms", baseline.mean_ms),
                        ("baseline_std_dev_ms", baseline.std_dev_ms),
                        ("z_score", z),
                    ],
                    if severity == AlertSeverity::Critical {
                        "Check downstream dependencies and consider throttling this endpoint"
                    } else {
                        "Review recent changes and consider caching or query optimization"
                    },
                ));
            }
        }

        if sample.memory_delta_bytes.unsigned_abs() > self.config.max_memory_bytes {
            alerts.push(self.alert(
                sample,
                AlertSeverity::High,
                AlertKind::Memory,
                format!(
                    "Memory delta {} bytes exceeds ceiling {} bytes",
                    sample.memory_delta_bytes, self.config.max_memory_bytes
                ),
                &[
                    ("memory_delta_bytes", sample.memory_delta_bytes as f64),
                    ("max_memory_bytes", self.config.max_memory_bytes as f64),
                ],
                "Look for unbounded buffers or large result sets; consider streaming the response",
            ));
        }

        if let Some(cpu_percent) = cpu_percent(sample) {
            if cpu_percent > self.config.cpu_threshold_percent {
                alerts.push(self.alert(
                    sample,
                    AlertSeverity::Medium,
                    AlertKind::Cpu,
                    format!(
                        "CPU time was {:.0}% of wall time (threshold {:.0}%)",
                        cpu_percent, self.config.cpu_threshold_percent
                    ),
                    &[
                        ("cpu_percent", cpu_percent),
                        ("cpu_delta_micros", sample.cpu_delta_micros as f64),
                    ],
                    "Profile the handler for hot loops or move heavy work off the request path",
                ));
            }
        }

        if sample.is_server_error() && recent_server_errors > self.config.error_burst_threshold {
            alerts.push(self.alert(
                sample,
                AlertSeverity::Critical,
                AlertKind::ErrorRate,
                format!(
                    "{} server errors in the last {}s",
                    recent_server_errors,
                    self.config.error_window.as_secs()
                ),
                &[
                    ("server_errors", recent_server_errors as f64),
                    ("status", sample.status as f64),
                ],
                "Inspect error logs for this endpoint and check dependency health",
            ));
        }

        for alert in &alerts {
            self.history.push(alert.clone());
        }
        alerts
    }

    /// Normalized anomaly score in [0, 1]: `|z| / z_critical`
    pub fn score(&self, sample: &MetricSample, baseline: Option<&Baseline>) -> f64 {
        match baseline {
            Some(b) => (b.z_score(sample.duration_ms).abs() / self.config.z_critical).clamp(0.0, 1.0),
            None => 0.0,
        }
    }

    fn latency_severity(&self, z: f64) -> Option<AlertSeverity> {
        let magnitude = z.abs();
        if magnitude > self.config.z_critical {
            Some(AlertSeverity::Critical)
        } else if magnitude > self.config.z_high {
            Some(AlertSeverity::High)
        } else {
            None
        }
    }

    fn alert(
        &self,
        sample: &MetricSample,
        severity: AlertSeverity,
        kind: AlertKind,
        message: String,
        values: &[(&str, f64)],
        suggestion: &str,
    ) -> AnomalyAlert {
        AnomalyAlert {
            severity,
            kind,
            endpoint: sample.endpoint.clone(),
            message,
            metrics: values
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<BTreeMap<_, _>>(),
            suggestion: suggestion.to_string(),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn history(&self) -> &AlertHistory {
        &self.history
    }
}

fn cpu_percent(sample: &MetricSample) -> Option<f64> {
    if sample.duration_ms <= 0.0 || sample.cpu_delta_micros == 0 {
        return None;
    }
    Some(sample.cpu_delta_micros as f64 / (sample.duration_ms * 1000.0) * 100.0)
}
