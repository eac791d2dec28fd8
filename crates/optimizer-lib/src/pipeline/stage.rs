//! The optimizer stage wrapped around a downstream handler
//!
//! Per request: predict, allocate, run the handler, then record the outcome
//! and feed the detector, the query learner and the load balancer. Handler
//! failures are recorded as server-error samples and returned unchanged.

use super::context::{HandlerResponse, OptimizationHeaders, RequestContext, RequestInfo, StageOutput};
use crate::allocator::{Allocation, AllocationReward, ResourceAllocator, ResourceProbe};
use crate::anomaly::{AnomalyAlert, AnomalyDetector};
use crate::balancer::{AdaptiveLoadBalancer, EndpointObservation};
use crate::config::OptimizerConfig;
use crate::models::{MetricSample, QueryExecution};
use crate::observability::{OptimizerMetrics, StructuredLogger};
use crate::predictor::PerformancePredictor;
use crate::query::QueryPatternLearner;
use crate::store::SampleStore;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Recent samples handed to the predictor per request
const PREDICTION_WINDOW: usize = 200;

/// Status recorded when the handler fails without producing a response
const HANDLER_FAILURE_STATUS: u16 = 500;

/// Components shared between the stage and the owning service
pub(crate) struct Components {
    pub config: OptimizerConfig,
    pub store: Arc<SampleStore>,
    pub predictor: Arc<PerformancePredictor>,
    pub detector: Arc<AnomalyDetector>,
    pub allocator: Arc<ResourceAllocator>,
    pub probe: Arc<dyn ResourceProbe>,
    pub reward: Option<Arc<dyn AllocationReward>>,
    pub queries: Arc<QueryPatternLearner>,
    pub balancer: Arc<AdaptiveLoadBalancer>,
    pub metrics: OptimizerMetrics,
    pub logger: StructuredLogger,
}

/// Cheap clonable handle that runs requests through the optimizer
#[derive(Clone)]
pub struct OptimizerStage {
    components: Arc<Components>,
}

impl OptimizerStage {
    pub(crate) fn new(components: Arc<Components>) -> Self {
        Self { components }
    }

    /// Run `handler` for `request` with prediction, allocation and feedback
    pub async fn process<T, E, F, Fut>(
        &self,
        request: &RequestInfo,
        handler: F,
    ) -> Result<StageOutput<T>, E>
    where
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = Result<HandlerResponse<T>, E>>,
    {
        let c = &self.components;
        let mut context = RequestContext::new(request.endpoint(), request.priority());

        if !c.config.enabled {
            let response = handler(context.clone()).await?;
            return Ok(StageOutput {
                response,
                headers: OptimizationHeaders::none(),
                context,
                alerts: Vec::new(),
            });
        }

        let pre_start = Instant::now();
        let allocation = self.prepare(&mut context);
        let pre_overhead = pre_start.elapsed();

        let handler_start = Instant::now();
        let outcome = handler(context.clone()).await;
        let handler_elapsed = handler_start.elapsed();
        c.metrics.observe_handler_duration(handler_elapsed.as_secs_f64());

        let post_start = Instant::now();
        let duration_ms = handler_elapsed.as_secs_f64() * 1000.0;

        match outcome {
            Ok(response) => {
                let sample = MetricSample {
                    timestamp_ms: chrono::Utc::now().timestamp_millis(),
                    endpoint: context.endpoint.clone(),
                    duration_ms,
                    status: response.status,
                    memory_delta_bytes: response.memory_delta_bytes,
                    cpu_delta_micros: response.cpu_delta_micros,
                    response_size: response.response_size,
                    query_count: (!response.queries.is_empty())
                        .then_some(response.queries.len() as u32),
                    cache_hit: response.cache_hit,
                };

                let (alerts, score) =
                    self.observe(&sample, allocation.as_ref(), &response.queries);
                let headers = OptimizationHeaders::from_context(&context, score);
                self.finish(pre_overhead, post_start);

                Ok(StageOutput {
                    response,
                    headers,
                    context,
                    alerts,
                })
            }
            Err(error) => {
                let sample = MetricSample {
                    timestamp_ms: chrono::Utc::now().timestamp_millis(),
                    endpoint: context.endpoint.clone(),
                    duration_ms,
                    status: HANDLER_FAILURE_STATUS,
                    memory_delta_bytes: 0,
                    cpu_delta_micros: 0,
                    response_size: 0,
                    query_count: None,
                    cache_hit: None,
                };
                self.observe(&sample, allocation.as_ref(), &[]);
                self.finish(pre_overhead, post_start);
                Err(error)
            }
        }
    }

    /// Prediction and allocation ahead of the handler
    fn prepare(&self, context: &mut RequestContext) -> Option<Allocation> {
        let c = &self.components;

        if c.config.features.performance_prediction {
            let recent = c.store.recent_for(&context.endpoint, PREDICTION_WINDOW);
            let prediction = c.predictor.predict(&context.endpoint, &recent);
            c.metrics.inc_predictions();
            if prediction.confidence >= c.config.prediction_confidence_threshold {
                context.optimization = Some(prediction.action);
            }
            context.prediction = Some(prediction);
        }

        if !c.config.features.resource_allocation {
            return None;
        }
        let load = c.store.current_load() as f64;
        let allocation = c.allocator.allocate(
            &context.endpoint,
            load,
            c.probe.available(),
            context.priority,
        );
        c.metrics.inc_allocations(&allocation.decision.strategy);
        context.allocation = Some(allocation.decision.clone());
        Some(allocation)
    }

    /// Record the sample and run the post-handler feedback
    fn observe(
        &self,
        sample: &MetricSample,
        allocation: Option<&Allocation>,
        queries: &[QueryExecution],
    ) -> (Vec<AnomalyAlert>, f64) {
        let c = &self.components;

        // Looked up first so the sample is scored against earlier requests only
        let baseline = if c.config.features.anomaly_detection {
            c.detector.baseline_for(&sample.endpoint, &c.store)
        } else {
            None
        };

        c.store.record(sample.clone());
        c.metrics.set_samples_stored(c.store.len() as i64);

        let (alerts, score) = if c.config.features.anomaly_detection {
            let errors = c.detector.recent_server_errors(sample, &c.store);
            let alerts = c.detector.detect(sample, baseline.as_ref(), errors);
            let score = c.detector.score(sample, baseline.as_ref());
            for alert in &alerts {
                c.metrics.inc_anomalies(alert.severity);
                c.logger.log_anomaly(&sample.endpoint, alert);
            }
            (alerts, score)
        } else {
            (Vec::new(), 0.0)
        };

        if c.config.features.query_optimization && !queries.is_empty() {
            for pattern in c.queries.learn(queries, sample.duration_ms) {
                c.logger.log_slow_query(
                    &pattern.pattern,
                    pattern.avg_ms,
                    pattern.count,
                    pattern.suggested_indexes.as_deref().unwrap_or_default(),
                );
            }
        }

        if c.config.features.load_balancing {
            c.balancer.update_metrics(EndpointObservation {
                endpoint: &sample.endpoint,
                response_time_ms: sample.duration_ms,
                success: !sample.is_server_error(),
            });
        }

        if let (Some(reward), Some(allocation)) = (&c.reward, allocation) {
            if let Some(value) = reward.reward(&allocation.decision, sample) {
                c.allocator
                    .update_q_value(allocation.state, allocation.action, value);
            }
        }

        (alerts, score)
    }

    fn finish(&self, pre_overhead: Duration, post_start: Instant) {
        let overhead = pre_overhead + post_start.elapsed();
        self.components
            .metrics
            .observe_stage_overhead(overhead.as_secs_f64());
    }
}
