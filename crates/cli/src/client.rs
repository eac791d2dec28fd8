//! API client for the optimizer agent's introspection endpoints

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// API client for the optimizer agent
pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid API URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Make a GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("API error ({}): {}", status, body);
        }

        response.json().await.context("Failed to parse response")
    }

    pub async fn stats(&self) -> Result<OptimizerStats> {
        self.get("v1/optimizer/stats").await
    }

    pub async fn health(&self) -> Result<HealthReport> {
        // 503 still carries the component breakdown
        let url = self.base_url.join("healthz").context("Invalid path")?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;
        response.json().await.context("Failed to parse response")
    }

    pub async fn baselines(&self) -> Result<Vec<Baseline>> {
        self.get("v1/optimizer/baselines").await
    }

    pub async fn alerts(&self, limit: usize) -> Result<Vec<Alert>> {
        self.get(&format!("v1/optimizer/alerts?limit={}", limit))
            .await
    }

    pub async fn queries(&self) -> Result<BTreeMap<String, QueryPattern>> {
        self.get("v1/optimizer/queries").await
    }

    pub async fn endpoints(&self) -> Result<Vec<EndpointHealth>> {
        self.get("v1/optimizer/endpoints").await
    }
}

// API response types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerStats {
    pub version: String,
    pub enabled: bool,
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
    pub store: StoreStats,
    pub current_load: u64,
    pub throughput_utilization: f64,
    pub predictor: PredictorStats,
    pub allocator: AllocatorStats,
    pub baselines: u64,
    pub alerts_total: u64,
    pub query_patterns: u64,
    pub tracked_endpoints: u64,
    pub last_training: Option<TrainingReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub entries: u64,
    pub capacity: u64,
    pub oldest_timestamp_ms: Option<i64>,
    pub newest_timestamp_ms: Option<i64>,
    pub retention_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictorStats {
    pub total_predictions: u64,
    pub fallback_predictions: u64,
    pub trained_endpoints: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorStats {
    pub decisions: u64,
    pub updates: u64,
    pub states_visited: u64,
    pub epsilon: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: u64,
    pub endpoints_trained: u64,
    pub baselines: u64,
    pub duration_ms: u64,
    pub completed_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: BTreeMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Baseline {
    pub endpoint: String,
    pub mean_ms: f64,
    pub std_dev_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub sample_count: u64,
    pub computed_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: String,
    pub kind: String,
    pub endpoint: String,
    pub message: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    pub suggestion: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPattern {
    pub pattern: String,
    pub count: u64,
    pub total_ms: f64,
    pub avg_ms: f64,
    pub suggested_indexes: Option<Vec<String>>,
    pub last_seen_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub endpoint: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub avg_response_time_ms: f64,
    pub last_updated_ms: i64,
    pub health_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_alerts_passes_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/optimizer/alerts?limit=5")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"severity":"critical","kind":"error_rate","endpoint":"GET /a",
                    "message":"11 server errors in the last 60s","metrics":{"server_errors":11.0},
                    "suggestion":"Inspect error logs","timestamp_ms":1700000000000}]"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let alerts = client.alerts(5).await.unwrap();

        mock.assert_async().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, "critical");
        assert_eq!(alerts[0].metrics["server_errors"], 11.0);
    }

    #[tokio::test]
    async fn test_fetch_queries_map() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/optimizer/queries")
            .with_status(200)
            .with_body(
                r#"{"select * from t where id = n":{"pattern":"select * from t where id = n",
                    "count":11,"total_ms":1650.0,"avg_ms":150.0,"suggested_indexes":["id"],
                    "last_seen_ms":1700000000000}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let queries = client.queries().await.unwrap();
        let pattern = &queries["select * from t where id = n"];
        assert_eq!(pattern.count, 11);
        assert_eq!(pattern.suggested_indexes.as_deref(), Some(&["id".to_string()][..]));
    }

    #[tokio::test]
    async fn test_api_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/optimizer/stats")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let err = client.stats().await.unwrap_err();
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_health_reads_unavailable_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body(
                r#"{"status":"unhealthy","components":{"trainer":{"status":"unhealthy",
                    "message":"lock poisoned","last_check_timestamp":0}}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let health = client.health().await.unwrap();
        assert_eq!(health.status, "unhealthy");
        assert_eq!(
            health.components["trainer"].message.as_deref(),
            Some("lock poisoned")
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(ApiClient::new("not a url").is_err());
    }
}
