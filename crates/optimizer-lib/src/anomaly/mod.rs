//! Anomaly detection for completed requests
//!
//! This module provides:
//! - Latency outliers by Z-score against per-endpoint baselines
//! - Memory ceiling and CPU share checks
//! - Server error bursts
//! - A bounded history of raised alerts

mod alerter;
mod detector;

pub use alerter::{AlertHistory, AlertKind, AlertSeverity, AnomalyAlert};
pub use detector::{AnomalyDetector, DetectorConfig};
