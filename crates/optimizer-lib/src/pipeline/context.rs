//! Typed per-request data passed through the optimizer stage

use crate::anomaly::AnomalyAlert;
use crate::models::{
    endpoint_key, AllocationDecision, PredictionResult, Priority, QueryExecution,
    RecommendedAction,
};
use std::collections::HashMap;

/// Response header carrying prediction confidence as an integer percent
pub const HEADER_PREDICTION_CONFIDENCE: &str = "x-ml-prediction-confidence";
/// Response header naming the applied optimization, or `none`
pub const HEADER_OPTIMIZATION_APPLIED: &str = "x-optimization-applied";
/// Response header carrying the anomaly score in [0, 1]
pub const HEADER_ANOMALY_SCORE: &str = "x-anomaly-score";
/// Request header selecting the allocation priority
pub const HEADER_REQUEST_PRIORITY: &str = "x-request-priority";

/// Read-only view of the inbound request
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    pub path: String,
    /// Header names are stored lowercased
    headers: HashMap<String, String>,
}

impl RequestInfo {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value);
        self
    }

    pub fn insert_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn endpoint(&self) -> String {
        endpoint_key(&self.method, &self.path)
    }

    pub fn priority(&self) -> Priority {
        self.header(HEADER_REQUEST_PRIORITY)
            .map(Priority::from_header)
            .unwrap_or_default()
    }
}

/// Decisions made before the handler runs
///
/// The handler receives its own copy and may use the allocation to size its
/// work.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub endpoint: String,
    pub priority: Priority,
    pub prediction: Option<PredictionResult>,
    pub allocation: Option<AllocationDecision>,
    /// Set when the prediction was confident enough to act on
    pub optimization: Option<RecommendedAction>,
}

impl RequestContext {
    pub fn new(endpoint: String, priority: Priority) -> Self {
        Self {
            endpoint,
            priority,
            prediction: None,
            allocation: None,
            optimization: None,
        }
    }
}

/// What the downstream handler reports about a successful run
#[derive(Debug, Clone)]
pub struct HandlerResponse<T> {
    pub body: T,
    pub status: u16,
    pub response_size: u64,
    pub queries: Vec<QueryExecution>,
    pub memory_delta_bytes: i64,
    pub cpu_delta_micros: u64,
    pub cache_hit: Option<bool>,
}

impl<T> HandlerResponse<T> {
    pub fn new(body: T, status: u16) -> Self {
        Self {
            body,
            status,
            response_size: 0,
            queries: Vec::new(),
            memory_delta_bytes: 0,
            cpu_delta_micros: 0,
            cache_hit: None,
        }
    }

    pub fn with_size(mut self, bytes: u64) -> Self {
        self.response_size = bytes;
        self
    }

    pub fn with_queries(mut self, queries: Vec<QueryExecution>) -> Self {
        self.queries = queries;
        self
    }

    pub fn with_usage(mut self, memory_delta_bytes: i64, cpu_delta_micros: u64) -> Self {
        self.memory_delta_bytes = memory_delta_bytes;
        self.cpu_delta_micros = cpu_delta_micros;
        self
    }

    pub fn with_cache_hit(mut self, hit: bool) -> Self {
        self.cache_hit = Some(hit);
        self
    }
}

/// Values for the three annotation headers
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationHeaders {
    pub prediction_confidence: u8,
    pub optimization_applied: String,
    pub anomaly_score: f64,
}

impl OptimizationHeaders {
    pub fn none() -> Self {
        Self {
            prediction_confidence: 0,
            optimization_applied: "none".to_string(),
            anomaly_score: 0.0,
        }
    }

    pub(crate) fn from_context(context: &RequestContext, anomaly_score: f64) -> Self {
        let confidence = context
            .prediction
            .as_ref()
            .map(|p| (p.confidence.clamp(0.0, 1.0) * 100.0).round() as u8)
            .unwrap_or(0);
        Self {
            prediction_confidence: confidence,
            optimization_applied: context
                .optimization
                .map(|a| a.as_str().to_string())
                .unwrap_or_else(|| "none".to_string()),
            anomaly_score: anomaly_score.clamp(0.0, 1.0),
        }
    }

    /// Header name/value pairs ready to attach to a response
    pub fn pairs(&self) -> [(&'static str, String); 3] {
        [
            (
                HEADER_PREDICTION_CONFIDENCE,
                self.prediction_confidence.to_string(),
            ),
            (HEADER_OPTIMIZATION_APPLIED, self.optimization_applied.clone()),
            (HEADER_ANOMALY_SCORE, format!("{:.3}", self.anomaly_score)),
        ]
    }
}

/// Result of running a request through the stage
#[derive(Debug)]
pub struct StageOutput<T> {
    pub response: HandlerResponse<T>,
    pub headers: OptimizationHeaders,
    pub context: RequestContext,
    pub alerts: Vec<AnomalyAlert>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceEstimate;

    #[test]
    fn test_request_info_headers_are_case_insensitive() {
        let info = RequestInfo::new("get", "/users").with_header("X-Request-Priority", "HIGH");
        assert_eq!(info.header("x-request-priority"), Some("HIGH"));
        assert_eq!(info.priority(), Priority::High);
        assert_eq!(info.endpoint(), "GET /users");
        assert_eq!(RequestInfo::new("GET", "/").priority(), Priority::Normal);
    }

    #[test]
    fn test_headers_from_context() {
        let mut context = RequestContext::new("GET /users".to_string(), Priority::Normal);
        context.prediction = Some(PredictionResult {
            expected_duration_ms: 20.0,
            confidence: 0.876,
            action: RecommendedAction::Prefetch,
            resources: ResourceEstimate::default(),
        });
        context.optimization = Some(RecommendedAction::Prefetch);

        let headers = OptimizationHeaders::from_context(&context, 0.25);
        let pairs = headers.pairs();
        assert_eq!(pairs[0], (HEADER_PREDICTION_CONFIDENCE, "88".to_string()));
        assert_eq!(pairs[1], (HEADER_OPTIMIZATION_APPLIED, "prefetch".to_string()));
        assert_eq!(pairs[2], (HEADER_ANOMALY_SCORE, "0.250".to_string()));
    }

    #[test]
    fn test_headers_without_prediction() {
        let context = RequestContext::new("GET /".to_string(), Priority::Low);
        assert_eq!(
            OptimizationHeaders::from_context(&context, 0.0),
            OptimizationHeaders::none()
        );
    }
}
