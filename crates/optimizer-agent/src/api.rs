//! HTTP API: health checks, Prometheus metrics and optimizer introspection

use crate::middleware::{optimize, QueryReport};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Extension, Json, Router,
};
use optimizer_lib::{models::QueryExecution, ComponentStatus, OptimizerService, RequestContext};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

/// Default number of alerts returned by `/v1/optimizer/alerts`
const DEFAULT_ALERT_LIMIT: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<OptimizerService>,
}

impl AppState {
    pub fn new(service: Arc<OptimizerService>) -> Self {
        Self { service }
    }
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.service.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.service.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.stats().await)
}

async fn baselines(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.baselines())
}

#[derive(Debug, Deserialize)]
struct AlertsParams {
    limit: Option<usize>,
}

async fn alerts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AlertsParams>,
) -> impl IntoResponse {
    Json(
        state
            .service
            .recent_alerts(params.limit.unwrap_or(DEFAULT_ALERT_LIMIT)),
    )
}

async fn queries(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.query_suggestions())
}

async fn endpoints(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.service.endpoint_health())
}

/// Built-in application route reporting the decisions made for it
async fn ping(Extension(context): Extension<RequestContext>) -> impl IntoResponse {
    let mut response = Json(serde_json::json!({
        "endpoint": context.endpoint,
        "priority": context.priority,
        "allocation": context.allocation,
        "optimization": context.optimization,
    }))
    .into_response();
    response
        .extensions_mut()
        .insert(QueryReport(vec![QueryExecution {
            query: "SELECT 1".to_string(),
            duration_ms: None,
        }]));
    response
}

/// Default application routes served by the agent binary
pub fn default_app() -> Router {
    Router::new().route("/api/ping", get(ping))
}

/// Create the API router
///
/// Routes in `app` run through the optimizer middleware; operational and
/// introspection routes do not. `app` must contain at least one route.
pub fn create_router(state: Arc<AppState>, app: Router) -> Router {
    let optimized = app.route_layer(middleware::from_fn_with_state(state.clone(), optimize));

    let ops = Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/optimizer/stats", get(stats))
        .route("/v1/optimizer/baselines", get(baselines))
        .route("/v1/optimizer/alerts", get(alerts))
        .route("/v1/optimizer/queries", get(queries))
        .route("/v1/optimizer/endpoints", get(endpoints))
        .with_state(state);

    optimized.merge(ops)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve<F>(port: u16, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
