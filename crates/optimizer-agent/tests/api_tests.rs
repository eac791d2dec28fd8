//! Integration tests for the agent API endpoints and optimizer middleware

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use optimizer_agent::api::{create_router, default_app, AppState};
use optimizer_agent::middleware::QueryReport;
use optimizer_lib::{
    health::components, models::QueryExecution, OptimizerConfig, OptimizerService,
};
use std::sync::Arc;
use tower::ServiceExt;

async fn items() -> impl IntoResponse {
    let mut response = "[]".into_response();
    response.extensions_mut().insert(QueryReport(vec![QueryExecution::new(
        "SELECT * FROM items WHERE owner_id = 7",
        150.0,
    )]));
    response
}

async fn broken() -> impl IntoResponse {
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

fn test_app() -> Router {
    Router::new()
        .route("/api/items/:owner", get(items))
        .route("/api/broken", get(broken))
}

async fn setup_test_app() -> (Router, Arc<OptimizerService>) {
    let service = Arc::new(OptimizerService::new(OptimizerConfig::default()).unwrap());
    service.start().await.unwrap();
    let state = Arc::new(AppState::new(service.clone()));
    (create_router(state, test_app()), service)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_endpoint_healthy() {
    let (app, _service) = setup_test_app().await;

    let (status, json) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert!(json["components"][components::TRAINER].is_object());
}

#[tokio::test]
async fn test_healthz_endpoint_unhealthy() {
    let (app, service) = setup_test_app().await;
    service
        .report_component_failure(components::SAMPLE_STORE, "lock poisoned")
        .await;

    let (status, json) = get_json(&app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_lifecycle() {
    let service = Arc::new(OptimizerService::new(OptimizerConfig::default()).unwrap());
    let app = create_router(Arc::new(AppState::new(service.clone())), test_app());

    let (status, json) = get_json(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["ready"], false);

    service.start().await.unwrap();
    let (status, _) = get_json(&app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    service.stop().await.unwrap();
    let (status, _) = get_json(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _service) = setup_test_app().await;
    app.clone()
        .oneshot(Request::builder().uri("/api/broken").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/plain; charset=utf-8"
    );

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("optimizer_stage_overhead_seconds"));
}

#[tokio::test]
async fn test_optimized_route_carries_headers() {
    let (app, _service) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/items/7")
                .header("x-request-priority", "high")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers.get("x-ml-prediction-confidence").unwrap(), "30");
    assert_eq!(headers.get("x-optimization-applied").unwrap(), "none");
    let score: f64 = headers
        .get("x-anomaly-score")
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((0.0..=1.0).contains(&score));
}

#[tokio::test]
async fn test_ops_routes_are_not_optimized() {
    let (app, _service) = setup_test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().get("x-anomaly-score").is_none());
}

#[tokio::test]
async fn test_introspection_endpoints() {
    let (app, _service) = setup_test_app().await;

    for owner in 0..11 {
        app.clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/items/{}", owner))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
    }
    app.clone()
        .oneshot(Request::builder().uri("/api/broken").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let (status, stats) = get_json(&app, "/v1/optimizer/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["store"]["entries"], 12);
    assert_eq!(stats["enabled"], true);

    let (_, endpoints) = get_json(&app, "/v1/optimizer/endpoints").await;
    let endpoints = endpoints.as_array().unwrap();
    assert_eq!(endpoints.len(), 2);
    let broken = endpoints
        .iter()
        .find(|e| e["endpoint"] == "GET /api/broken")
        .unwrap();
    assert_eq!(broken["successful_requests"], 0);
    let items = endpoints
        .iter()
        .find(|e| e["endpoint"] == "GET /api/items/:owner")
        .unwrap();
    assert_eq!(items["total_requests"], 11);
    assert!(items["health_score"].as_f64().unwrap() > 0.9);

    let (_, queries) = get_json(&app, "/v1/optimizer/queries").await;
    let pattern = &queries["select * from items where owner_id = n"];
    assert_eq!(pattern["count"], 11);
    assert_eq!(pattern["suggested_indexes"][0], "owner_id");

    let (status, alerts) = get_json(&app, "/v1/optimizer/alerts?limit=5").await;
    assert_eq!(status, StatusCode::OK);
    assert!(alerts.as_array().unwrap().len() <= 5);

    let (status, baselines) = get_json(&app, "/v1/optimizer/baselines").await;
    assert_eq!(status, StatusCode::OK);
    assert!(baselines.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_default_app_reports_context() {
    let (_, service) = setup_test_app().await;
    let app = create_router(Arc::new(AppState::new(service)), default_app());

    let (status, json) = get_json(&app, "/api/ping").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["endpoint"], "GET /api/ping");
    assert_eq!(json["priority"], "normal");
    assert!(json["allocation"]["workers"].as_u64().unwrap() >= 1);
}
