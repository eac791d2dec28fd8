//! Anomaly alerts and their in-memory history

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Default number of alerts retained in history
const DEFAULT_HISTORY_LIMIT: usize = 1_000;

/// Alert severity levels, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dimension an alert was raised on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Latency,
    Memory,
    Cpu,
    ErrorRate,
    Throughput,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlertKind::Latency => "latency",
            AlertKind::Memory => "memory",
            AlertKind::Cpu => "cpu",
            AlertKind::ErrorRate => "error_rate",
            AlertKind::Throughput => "throughput",
        };
        f.write_str(name)
    }
}

/// An anomaly raised for one completed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub severity: AlertSeverity,
    pub kind: AlertKind,
    pub endpoint: String,
    pub message: String,
    /// Metric values that triggered the alert
    pub metrics: BTreeMap<String, f64>,
    pub suggestion: String,
    pub timestamp_ms: i64,
}

/// Bounded, append-only alert history
pub struct AlertHistory {
    alerts: Mutex<VecDeque<AnomalyAlert>>,
    limit: usize,
    total: std::sync::atomic::AtomicU64,
}

impl AlertHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::with_capacity(limit.min(1_024))),
            limit: limit.max(1),
            total: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn push(&self, alert: AnomalyAlert) {
        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        if alerts.len() >= self.limit {
            alerts.pop_front();
        }
        alerts.push_back(alert);
        self.total.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// The newest `n` alerts, oldest first
    pub fn recent(&self, n: usize) -> Vec<AnomalyAlert> {
        let alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = alerts.len().saturating_sub(n);
        alerts.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.alerts.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Alerts raised since start, including ones dropped from history
    pub fn total_raised(&self) -> u64 {
        self.total.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl Default for AlertHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
