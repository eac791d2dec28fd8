//! Performance prediction and background training

mod features;
mod forecast;
mod scheduler;

pub use features::{exponential_smoothing, smoothing_series, EndpointHistory};
pub use forecast::{PerformancePredictor, PredictorConfig, PredictorStats};
pub use scheduler::{TrainingReport, TrainingScheduler, DEFAULT_TRAINING_INTERVAL};

use crate::error::Result;
use crate::models::{MetricSample, PredictionResult};

/// Trait for request-cost forecasters
pub trait Predictor: Send + Sync {
    /// Forecast the cost of the next request to `endpoint`
    fn predict(&self, endpoint: &str, recent: &[MetricSample]) -> PredictionResult;

    /// Rebuild internal state from a batch of samples; returns endpoints trained
    fn train(&self, batch: &[MetricSample]) -> Result<usize>;
}
