//! Core data models for the optimizer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier combining HTTP method and path, e.g. `GET /users`
pub fn endpoint_key(method: &str, path: &str) -> String {
    format!("{} {}", method.to_ascii_uppercase(), path)
}

/// One observation of a completed request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    /// Unix timestamp in milliseconds when the request completed
    pub timestamp_ms: i64,
    pub endpoint: String,
    pub duration_ms: f64,
    pub status: u16,
    pub memory_delta_bytes: i64,
    pub cpu_delta_micros: u64,
    pub response_size: u64,
    pub query_count: Option<u32>,
    pub cache_hit: Option<bool>,
}

impl MetricSample {
    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

/// A data-access operation reported by the downstream handler
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryExecution {
    pub query: String,
    /// Per-query duration; when absent the request's total is split evenly
    pub duration_ms: Option<f64>,
}

impl QueryExecution {
    pub fn new(query: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            query: query.into(),
            duration_ms: Some(duration_ms),
        }
    }
}

/// Mitigation recommended by the performance predictor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendedAction {
    Cache,
    Prefetch,
    Batch,
    Optimize,
    Throttle,
}

impl RecommendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendedAction::Cache => "cache",
            RecommendedAction::Prefetch => "prefetch",
            RecommendedAction::Batch => "batch",
            RecommendedAction::Optimize => "optimize",
            RecommendedAction::Throttle => "throttle",
        }
    }
}

impl fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected resource consumption of a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceEstimate {
    pub memory_bytes: f64,
    pub cpu_micros: f64,
    pub io_ms: f64,
}

/// Forecast produced for an incoming request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub expected_duration_ms: f64,
    /// Heuristic confidence in [0, 1]
    pub confidence: f64,
    pub action: RecommendedAction,
    pub resources: ResourceEstimate,
}

/// Request priority used to scale allocations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Parse a priority header value; unknown values are normal
    pub fn from_header(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            _ => Priority::Normal,
        }
    }

    pub fn multiplier(&self) -> f64 {
        match self {
            Priority::High => 1.5,
            Priority::Normal => 1.0,
            Priority::Low => 0.5,
        }
    }
}

/// Resources currently available to the host
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AvailableResources {
    pub memory_mb: f64,
    pub cpu_units: f64,
}

/// Budget assigned to a single request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationDecision {
    pub memory_mb: f64,
    pub cpu_units: f64,
    pub workers: u32,
    pub strategy: String,
}
