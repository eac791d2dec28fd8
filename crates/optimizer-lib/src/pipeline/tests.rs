//! Tests for the optimizer stage running against in-process handlers

use super::*;
use crate::allocator::AllocationReward;
use crate::anomaly::{AlertKind, AlertSeverity};
use crate::config::OptimizerConfig;
use crate::models::{AllocationDecision, MetricSample, QueryExecution};
use crate::service::OptimizerService;
use std::convert::Infallible;
use std::sync::Arc;

#[derive(Debug, PartialEq)]
struct HandlerFailed(&'static str);

fn request(path: &str) -> RequestInfo {
    RequestInfo::new("GET", path)
}

async fn ok(status: u16) -> Result<HandlerResponse<&'static str>, Infallible> {
    Ok(HandlerResponse::new("ok", status).with_size(2))
}

#[tokio::test]
async fn test_successful_request_is_recorded_and_annotated() {
    let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
    let stage = service.stage();

    let output = stage
        .process(&request("/users"), |ctx| async move {
            assert_eq!(ctx.endpoint, "GET /users");
            assert!(ctx.prediction.is_some());
            assert!(ctx.allocation.is_some());
            ok(200).await
        })
        .await
        .unwrap();

    assert_eq!(output.response.body, "ok");
    // No history yet: default prediction at 30% confidence is not acted on
    assert_eq!(output.headers.prediction_confidence, 30);
    assert_eq!(output.headers.optimization_applied, "none");
    assert_eq!(output.headers.anomaly_score, 0.0);
    let names: Vec<&str> = output.headers.pairs().iter().map(|(n, _)| *n).collect();
    assert_eq!(
        names,
        vec![
            HEADER_PREDICTION_CONFIDENCE,
            HEADER_OPTIMIZATION_APPLIED,
            HEADER_ANOMALY_SCORE
        ]
    );

    let stats = service.stats().await;
    assert_eq!(stats.store.entries, 1);
    assert_eq!(stats.tracked_endpoints, 1);
    assert_eq!(stats.allocator.decisions, 1);
    assert_eq!(service.endpoint_health()[0].health.endpoint, "GET /users");
}

#[tokio::test]
async fn test_handler_error_is_returned_unchanged() {
    let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
    let stage = service.stage();

    let result: Result<StageOutput<()>, HandlerFailed> = stage
        .process(&request("/boom"), |_| async { Err(HandlerFailed("db down")) })
        .await;

    assert_eq!(result.unwrap_err(), HandlerFailed("db down"));
    let health = service.endpoint_health();
    assert_eq!(health[0].health.total_requests, 1);
    assert_eq!(health[0].health.successful_requests, 0);
    assert_eq!(service.stats().await.store.entries, 1);
}

#[tokio::test]
async fn test_disabled_stage_only_forwards() {
    let config = OptimizerConfig {
        enabled: false,
        ..OptimizerConfig::default()
    };
    let service = OptimizerService::new(config).unwrap();

    let output = service
        .stage()
        .process(&request("/users"), |ctx| async move {
            assert!(ctx.prediction.is_none());
            ok(200).await
        })
        .await
        .unwrap();

    assert_eq!(output.headers, OptimizationHeaders::none());
    assert_eq!(service.stats().await.store.entries, 0);
}

#[tokio::test]
async fn test_steady_endpoint_gets_confident_optimization() {
    let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
    let stage = service.stage();

    let mut last = None;
    for _ in 0..15 {
        last = Some(
            stage
                .process(&request("/steady"), |_| ok(200))
                .await
                .unwrap(),
        );
    }
    let output = last.unwrap();
    assert!(output.headers.prediction_confidence >= 70);
    assert_ne!(output.headers.optimization_applied, "none");
    assert_eq!(
        output.context.optimization.map(|a| a.as_str().to_string()),
        Some(output.headers.optimization_applied.clone())
    );
}

#[tokio::test]
async fn test_reported_queries_feed_learner() {
    let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
    let stage = service.stage();

    for _ in 0..11 {
        stage
            .process(&request("/t"), |_| async {
                Ok::<_, Infallible>(HandlerResponse::new((), 200).with_queries(vec![
                    QueryExecution::new("SELECT * FROM t WHERE id = 42", 150.0),
                ]))
            })
            .await
            .unwrap();
    }

    let suggestions = service.query_suggestions();
    let pattern = &suggestions["select * from t where id = n"];
    assert_eq!(pattern.count, 11);
    assert!(pattern.suggested_indexes.is_some());
}

#[tokio::test]
async fn test_server_error_burst_raises_critical_alert() {
    let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
    let stage = service.stage();

    let mut alerts = Vec::new();
    for _ in 0..11 {
        alerts = stage
            .process(&request("/flaky"), |_| ok(503))
            .await
            .unwrap()
            .alerts;
    }

    let burst = alerts
        .iter()
        .find(|a| a.kind == AlertKind::ErrorRate)
        .expect("error-rate alert");
    assert_eq!(burst.severity, AlertSeverity::Critical);
    assert!(!service.recent_alerts(5).is_empty());
}

#[tokio::test]
async fn test_slow_request_on_untrained_endpoint_is_flagged() {
    let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
    let stage = service.stage();

    for i in 0..9u64 {
        stage
            .process(&request("/fresh"), |_| async move {
                tokio::time::sleep(std::time::Duration::from_millis(1 + i % 3)).await;
                ok(200).await
            })
            .await
            .unwrap();
    }

    let output = stage
        .process(&request("/fresh"), |_| async {
            tokio::time::sleep(std::time::Duration::from_millis(300)).await;
            ok(200).await
        })
        .await
        .unwrap();

    let latency = output
        .alerts
        .iter()
        .find(|a| a.kind == AlertKind::Latency)
        .expect("latency alert");
    assert_eq!(latency.severity, AlertSeverity::Critical);
    assert_eq!(output.headers.anomaly_score, 1.0);
    assert!(service.baselines().is_empty());
}

#[tokio::test]
async fn test_memory_ceiling_alert() {
    let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
    let output = service
        .stage()
        .process(&request("/export"), |_| async {
            Ok::<_, Infallible>(HandlerResponse::new((), 200).with_usage(1 << 30, 0))
        })
        .await
        .unwrap();

    assert_eq!(output.alerts.len(), 1);
    assert_eq!(output.alerts[0].kind, AlertKind::Memory);
}

struct ConstantReward;

impl AllocationReward for ConstantReward {
    fn reward(&self, _decision: &AllocationDecision, sample: &MetricSample) -> Option<f64> {
        (!sample.is_server_error()).then_some(1.0)
    }
}

#[tokio::test]
async fn test_reward_hook_updates_policy() {
    let service = OptimizerService::builder(OptimizerConfig::default())
        .reward(Arc::new(ConstantReward))
        .build()
        .unwrap();
    let stage = service.stage();

    stage.process(&request("/a"), |_| ok(200)).await.unwrap();
    stage.process(&request("/a"), |_| ok(500)).await.unwrap();

    let stats = service.stats().await;
    assert_eq!(stats.allocator.decisions, 2);
    assert_eq!(stats.allocator.updates, 1);
}

#[tokio::test]
async fn test_no_policy_update_without_reward_hook() {
    let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
    service
        .stage()
        .process(&request("/a"), |_| ok(200))
        .await
        .unwrap();
    assert_eq!(service.stats().await.allocator.updates, 0);
}

#[tokio::test]
async fn test_training_builds_baselines_from_stage_samples() {
    let service = OptimizerService::new(OptimizerConfig::default()).unwrap();
    let stage = service.stage();
    for path in ["/a", "/b"] {
        for _ in 0..3 {
            stage.process(&request(path), |_| ok(200)).await.unwrap();
        }
    }

    let report = service.train_now().await.unwrap();
    assert_eq!(report.samples, 6);
    assert_eq!(report.endpoints_trained, 2);

    let endpoints: Vec<String> = service.baselines().into_iter().map(|b| b.endpoint).collect();
    assert_eq!(endpoints, vec!["GET /a", "GET /b"]);
}
