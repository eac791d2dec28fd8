//! Adaptive request optimizer
//!
//! This crate provides the in-process control loop that observes every
//! request and learns from it:
//! - Bounded metric sample store with retention sweep
//! - Per-endpoint baselines and exponential-smoothing prediction
//! - Anomaly detection on latency, memory, CPU and server errors
//! - Epsilon-greedy resource allocation
//! - Query pattern learning and endpoint health scoring
//! - Periodic background training, health checks and observability
//!
//! Hosts build an [`OptimizerService`], call [`OptimizerService::start`], and
//! run each request through [`OptimizerStage::process`].

pub mod allocator;
pub mod anomaly;
pub mod balancer;
pub mod baseline;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;
pub mod query;
pub mod service;
pub mod store;

pub use config::OptimizerConfig;
pub use error::{OptimizerError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{OptimizerMetrics, StructuredLogger};
pub use pipeline::{HandlerResponse, OptimizationHeaders, OptimizerStage, RequestContext, RequestInfo};
pub use service::{EndpointScore, OptimizerService, OptimizerStats};
