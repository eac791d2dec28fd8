//! History features for forecasting
//!
//! Reduces a window of samples for one endpoint to the handful of values the
//! predictor's rules need: the duration sequence, its smoothed forecast, and
//! average resource usage.

use crate::baseline::{mean, population_variance};
use crate::models::MetricSample;

/// Summary of an endpoint's recent history
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointHistory {
    pub durations: Vec<f64>,
    pub avg_memory_bytes: f64,
    pub avg_cpu_micros: f64,
    /// Share of cache-reporting samples that hit; 0 when none reported
    pub cache_hit_rate: f64,
}

impl EndpointHistory {
    pub fn from_samples(samples: &[MetricSample]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let n = samples.len() as f64;
        let reported: Vec<bool> = samples.iter().filter_map(|s| s.cache_hit).collect();
        let cache_hit_rate = if reported.is_empty() {
            0.0
        } else {
            reported.iter().filter(|hit| **hit).count() as f64 / reported.len() as f64
        };

        Self {
            durations: samples.iter().map(|s| s.duration_ms).collect(),
            avg_memory_bytes: samples.iter().map(|s| s.memory_delta_bytes as f64).sum::<f64>() / n,
            avg_cpu_micros: samples.iter().map(|s| s.cpu_delta_micros as f64).sum::<f64>() / n,
            cache_hit_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn mean(&self) -> f64 {
        mean(&self.durations)
    }

    pub fn variance(&self) -> f64 {
        population_variance(&self.durations, self.mean())
    }

    /// Keep only the newest `limit` durations
    pub fn truncate_front(&mut self, limit: usize) {
        if self.durations.len() > limit {
            self.durations.drain(0..self.durations.len() - limit);
        }
    }
}

/// Forecast after each observation of `values`
///
/// The first forecast is the first value; each later forecast is
/// `alpha * actual + (1 - alpha) * previous`.
pub fn smoothing_series(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut series = Vec::with_capacity(values.len());
    let mut iter = values.iter();
    let Some(&first) = iter.next() else {
        return series;
    };
    let mut forecast = first;
    series.push(forecast);
    for &actual in iter {
        forecast = alpha * actual + (1.0 - alpha) * forecast;
        series.push(forecast);
    }
    series
}

/// Final exponential-smoothing forecast of `values`, 0 when empty
pub fn exponential_smoothing(values: &[f64], alpha: f64) -> f64 {
    smoothing_series(values, alpha).last().copied().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(duration_ms: f64, memory: i64, cache_hit: Option<bool>) -> MetricSample {
        MetricSample {
            timestamp_ms: 0,
            endpoint: "GET /a".to_string(),
            duration_ms,
            status: 200,
            memory_delta_bytes: memory,
            cpu_delta_micros: 100,
            response_size: 0,
            query_count: None,
            cache_hit,
        }
    }

    #[test]
    fn test_smoothing_seed_and_recurrence() {
        let series = smoothing_series(&[10.0, 20.0, 20.0], 0.5);
        assert_eq!(series, vec![10.0, 15.0, 17.5]);
        assert_eq!(exponential_smoothing(&[], 0.3), 0.0);
    }

    #[test]
    fn test_monotonic_input_gives_monotonic_bounded_forecast() {
        let values: Vec<f64> = (1..=50).map(|v| (v * v) as f64).collect();
        let series = smoothing_series(&values, 0.3);
        let first = values[0];
        let last = *values.last().unwrap();
        for pair in series.windows(2) {
            assert!(pair[1] >= pair[0], "forecast decreased: {:?}", pair);
        }
        for f in &series {
            assert!(*f >= first && *f <= last);
        }
    }

    #[test]
    fn test_history_summary() {
        let samples = vec![
            sample(10.0, 100, Some(true)),
            sample(20.0, 300, Some(false)),
            sample(30.0, 200, None),
        ];
        let history = EndpointHistory::from_samples(&samples);
        assert_eq!(history.len(), 3);
        assert!((history.mean() - 20.0).abs() < 1e-9);
        assert!((history.avg_memory_bytes - 200.0).abs() < 1e-9);
        assert!((history.cache_hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_no_cache_reports_means_zero_hit_rate() {
        let history = EndpointHistory::from_samples(&[sample(10.0, 0, None)]);
        assert_eq!(history.cache_hit_rate, 0.0);
    }

    #[test]
    fn test_truncate_front_keeps_newest() {
        let mut history = EndpointHistory {
            durations: vec![1.0, 2.0, 3.0, 4.0],
            ..Default::default()
        };
        history.truncate_front(2);
        assert_eq!(history.durations, vec![3.0, 4.0]);
    }
}
