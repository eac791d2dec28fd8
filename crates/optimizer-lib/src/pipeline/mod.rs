//! Request pipeline integration
//!
//! The host invokes [`OptimizerStage::process`] once per request with a
//! closure that runs the downstream handler. The stage returns the handler's
//! response together with the annotation headers.

mod context;
mod stage;

#[cfg(test)]
mod tests;

pub use context::{
    HandlerResponse, OptimizationHeaders, RequestContext, RequestInfo, StageOutput,
    HEADER_ANOMALY_SCORE, HEADER_OPTIMIZATION_APPLIED, HEADER_PREDICTION_CONFIDENCE,
    HEADER_REQUEST_PRIORITY,
};
pub(crate) use stage::Components;
pub use stage::OptimizerStage;
