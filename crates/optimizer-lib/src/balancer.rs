//! Rolling health scores for logical endpoints

use crate::config::OptimizerConfig;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Score reported for endpoints with no observations
pub const UNKNOWN_HEALTH_SCORE: f64 = 0.5;

/// Response time at which the latency half of the score reaches zero
const RESPONSE_TIME_CEILING_MS: f64 = 1000.0;

const SUCCESS_WEIGHT: f64 = 0.7;
const LATENCY_WEIGHT: f64 = 0.3;

/// Outcome of one call to an endpoint
#[derive(Debug, Clone)]
pub struct EndpointObservation<'a> {
    pub endpoint: &'a str,
    pub response_time_ms: f64,
    pub success: bool,
}

/// Running counters for one endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub endpoint: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub avg_response_time_ms: f64,
    pub last_updated_ms: i64,
}

impl EndpointHealth {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.successful_requests as f64 / self.total_requests as f64
    }

    /// `0.7 * success rate + 0.3 * max(0, 1 - avg / 1000)`
    pub fn score(&self) -> f64 {
        if self.total_requests == 0 {
            return UNKNOWN_HEALTH_SCORE;
        }
        let latency = (1.0 - self.avg_response_time_ms / RESPONSE_TIME_CEILING_MS).max(0.0);
        SUCCESS_WEIGHT * self.success_rate() + LATENCY_WEIGHT * latency
    }
}

/// Health-weighted endpoint tracker
pub struct AdaptiveLoadBalancer {
    alpha: f64,
    endpoints: DashMap<String, EndpointHealth>,
}

impl AdaptiveLoadBalancer {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            endpoints: DashMap::new(),
        }
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        Self::new(config.tuning.balancer_alpha)
    }

    pub fn update_metrics(&self, observation: EndpointObservation<'_>) {
        let now = chrono::Utc::now().timestamp_millis();
        let mut entry = self
            .endpoints
            .entry(observation.endpoint.to_string())
            .or_insert_with(|| EndpointHealth {
                endpoint: observation.endpoint.to_string(),
                total_requests: 0,
                successful_requests: 0,
                avg_response_time_ms: observation.response_time_ms,
                last_updated_ms: now,
            });

        entry.total_requests += 1;
        if observation.success {
            entry.successful_requests += 1;
        }
        entry.avg_response_time_ms = self.alpha * observation.response_time_ms
            + (1.0 - self.alpha) * entry.avg_response_time_ms;
        entry.last_updated_ms = now;
    }

    pub fn get_health_score(&self, endpoint: &str) -> f64 {
        self.endpoints
            .get(endpoint)
            .map(|h| h.score())
            .unwrap_or(UNKNOWN_HEALTH_SCORE)
    }

    /// Candidate with the highest health score; earlier candidates win ties
    pub fn select<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        let mut best: Option<(&'a str, f64)> = None;
        for &candidate in candidates {
            let score = self.get_health_score(candidate);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((candidate, score)),
            }
        }
        best.map(|(candidate, _)| candidate)
    }

    /// Copy of every tracked endpoint, sorted by name
    pub fn snapshot(&self) -> Vec<EndpointHealth> {
        let mut all: Vec<EndpointHealth> = self.endpoints.iter().map(|e| e.value().clone()).collect();
        all.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        all
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl Default for AdaptiveLoadBalancer {
    fn default() -> Self {
        Self::new(0.2)
    }
}
