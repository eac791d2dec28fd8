//! Per-endpoint latency baselines
//!
//! Baselines are recomputed wholesale from a window of samples. There is no
//! incremental merge, so a baseline is always a pure function of the window
//! it was built from.

use crate::error::{OptimizerError, Result};
use crate::models::MetricSample;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Statistical baseline for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub endpoint: String,
    pub mean_ms: f64,
    /// Population standard deviation; may be zero
    pub std_dev_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub sample_count: usize,
    pub computed_at_ms: i64,
}

impl Baseline {
    /// Build a baseline from raw durations
    pub fn from_durations(endpoint: &str, durations: &[f64], computed_at_ms: i64) -> Option<Self> {
        if durations.is_empty() {
            return None;
        }
        let mut sorted = durations.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mean = mean(&sorted);
        Some(Self {
            endpoint: endpoint.to_string(),
            mean_ms: mean,
            std_dev_ms: population_variance(&sorted, mean).sqrt(),
            p95_ms: percentile_sorted(&sorted, 95.0),
            p99_ms: percentile_sorted(&sorted, 99.0),
            sample_count: sorted.len(),
            computed_at_ms,
        })
    }

    /// Signed number of standard deviations `value` lies from the mean
    ///
    /// A zero-variance baseline yields 0 instead of dividing by zero.
    pub fn z_score(&self, value: f64) -> f64 {
        if self.std_dev_ms < f64::EPSILON {
            return 0.0;
        }
        (value - self.mean_ms) / self.std_dev_ms
    }
}

/// Group samples by endpoint and compute a baseline for each group
pub fn compute_baselines(samples: &[MetricSample], computed_at_ms: i64) -> HashMap<String, Baseline> {
    let mut grouped: HashMap<&str, Vec<f64>> = HashMap::new();
    for sample in samples {
        grouped
            .entry(sample.endpoint.as_str())
            .or_default()
            .push(sample.duration_ms);
    }

    grouped
        .into_iter()
        .filter_map(|(endpoint, durations)| {
            Baseline::from_durations(endpoint, &durations, computed_at_ms)
                .map(|b| (endpoint.to_string(), b))
        })
        .collect()
}

/// Holds the most recent baseline snapshot
///
/// Readers clone an `Arc` of the snapshot; recomputation swaps it atomically.
#[derive(Default)]
pub struct BaselineTracker {
    snapshot: RwLock<Arc<HashMap<String, Baseline>>>,
}

impl BaselineTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all baselines with ones computed from `samples`
    pub fn recompute(&self, samples: &[MetricSample]) -> Result<usize> {
        let fresh = compute_baselines(samples, chrono::Utc::now().timestamp_millis());
        let count = fresh.len();
        let mut snapshot = self
            .snapshot
            .write()
            .map_err(|_| OptimizerError::LockPoisoned("baseline snapshot"))?;
        *snapshot = Arc::new(fresh);
        Ok(count)
    }

    pub fn get(&self, endpoint: &str) -> Option<Baseline> {
        self.snapshot().get(endpoint).cloned()
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, Baseline>> {
        match self.snapshot.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn population_variance(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(endpoint: &str, duration_ms: f64) -> MetricSample {
        MetricSample {
            timestamp_ms: 0,
            endpoint: endpoint.to_string(),
            duration_ms,
            status: 200,
            memory_delta_bytes: 0,
            cpu_delta_micros: 0,
            response_size: 0,
            query_count: None,
            cache_hit: None,
        }
    }

    #[test]
    fn test_population_statistics() {
        let durations = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let baseline = Baseline::from_durations("GET /a", &durations, 0).unwrap();
        assert!((baseline.mean_ms - 5.0).abs() < 1e-9);
        // Population std dev of this set is exactly 2
        assert!((baseline.std_dev_ms - 2.0).abs() < 1e-9);
        assert_eq!(baseline.sample_count, 8);
    }

    #[test]
    fn test_percentiles() {
        let durations: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let baseline = Baseline::from_durations("GET /a", &durations, 0).unwrap();
        assert!((94.0..=96.0).contains(&baseline.p95_ms), "p95 was {}", baseline.p95_ms);
        assert!((98.0..=100.0).contains(&baseline.p99_ms), "p99 was {}", baseline.p99_ms);
    }

    #[test]
    fn test_zero_variance_z_score_is_guarded() {
        let baseline = Baseline::from_durations("GET /a", &[42.0], 0).unwrap();
        assert_eq!(baseline.std_dev_ms, 0.0);
        let z = baseline.z_score(1_000.0);
        assert_eq!(z, 0.0);
        assert!(z.is_finite());
    }

    #[test]
    fn test_compute_groups_by_endpoint() {
        let samples = vec![
            sample("GET /a", 10.0),
            sample("GET /b", 100.0),
            sample("GET /a", 30.0),
        ];
        let baselines = compute_baselines(&samples, 0);
        assert_eq!(baselines.len(), 2);
        assert!((baselines["GET /a"].mean_ms - 20.0).abs() < 1e-9);
        assert!((baselines["GET /b"].mean_ms - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_recompute_replaces_wholesale() {
        let tracker = BaselineTracker::new();
        tracker
            .recompute(&[sample("GET /a", 10.0), sample("GET /b", 20.0)])
            .unwrap();
        assert_eq!(tracker.len(), 2);

        tracker.recompute(&[sample("GET /c", 5.0)]).unwrap();
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get("GET /a").is_none());
        assert!(tracker.get("GET /c").is_some());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let tracker = BaselineTracker::new();
        let samples = vec![sample("GET /a", 10.0), sample("GET /a", 50.0)];
        tracker.recompute(&samples).unwrap();
        let first = tracker.get("GET /a").unwrap();
        tracker.recompute(&samples).unwrap();
        let second = tracker.get("GET /a").unwrap();
        assert_eq!(first.mean_ms, second.mean_ms);
        assert_eq!(first.std_dev_ms, second.std_dev_ms);
        assert_eq!(first.p99_ms, second.p99_ms);
    }
}
