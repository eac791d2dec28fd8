//! Commands that inspect what the optimizer has learned

use anyhow::Result;
use clap::ValueEnum;
use tabled::Tabled;

use crate::client::{Alert, ApiClient};
use crate::output::{
    color_score, color_status, format_ms, format_percent, format_timestamp_ms, print_info,
    print_json, print_rows, OutputFormat,
};

/// Minimum alert severity to display
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Severity::Low),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

/// Keep alerts at or above `min`; unknown severities are kept
fn filter_alerts(alerts: Vec<Alert>, min: Option<Severity>) -> Vec<Alert> {
    match min {
        Some(min) => alerts
            .into_iter()
            .filter(|a| Severity::parse(&a.severity).map_or(true, |s| s >= min))
            .collect(),
        None => alerts,
    }
}

#[derive(Tabled)]
struct BaselineRow {
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "Std Dev")]
    std_dev: String,
    #[tabled(rename = "P95")]
    p95: String,
    #[tabled(rename = "P99")]
    p99: String,
    #[tabled(rename = "Samples")]
    samples: u64,
}

#[derive(Tabled)]
struct AlertRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Message")]
    message: String,
}

#[derive(Tabled)]
struct QueryRow {
    #[tabled(rename = "Pattern")]
    pattern: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "Avg")]
    avg: String,
    #[tabled(rename = "Suggested Indexes")]
    indexes: String,
}

#[derive(Tabled)]
struct EndpointRow {
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Requests")]
    requests: u64,
    #[tabled(rename = "Success")]
    success: String,
    #[tabled(rename = "Avg Latency")]
    latency: String,
    #[tabled(rename = "Score")]
    score: String,
}

/// Show per-endpoint latency baselines
pub async fn show_baselines(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let baselines = client.baselines().await?;

    match format {
        OutputFormat::Json => print_json(&baselines)?,
        OutputFormat::Table => {
            let rows = baselines
                .into_iter()
                .map(|b| BaselineRow {
                    endpoint: b.endpoint,
                    mean: format_ms(b.mean_ms),
                    std_dev: format_ms(b.std_dev_ms),
                    p95: format_ms(b.p95_ms),
                    p99: format_ms(b.p99_ms),
                    samples: b.sample_count,
                })
                .collect();
            print_rows(rows, "No baselines yet; they are computed on the next training run");
        }
    }

    Ok(())
}

/// Show recent anomaly alerts, newest first
pub async fn show_alerts(
    client: &ApiClient,
    limit: usize,
    severity: Option<Severity>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let alerts = filter_alerts(client.alerts(limit).await?, severity);

    match format {
        OutputFormat::Json => print_json(&alerts)?,
        OutputFormat::Table => {
            if verbose {
                for alert in &alerts {
                    print_info(&format!("{}: {}", alert.endpoint, alert.suggestion));
                }
            }
            let rows = alerts
                .into_iter()
                .map(|a| AlertRow {
                    time: format_timestamp_ms(a.timestamp_ms),
                    severity: color_status(&a.severity),
                    kind: a.kind,
                    endpoint: a.endpoint,
                    message: a.message,
                })
                .collect();
            print_rows(rows, "No alerts");
        }
    }

    Ok(())
}

/// Show learned query patterns
pub async fn show_queries(client: &ApiClient, slow_only: bool, format: OutputFormat) -> Result<()> {
    let mut patterns: Vec<_> = client
        .queries()
        .await?
        .into_values()
        .filter(|p| !slow_only || p.suggested_indexes.is_some())
        .collect();
    patterns.sort_by(|a, b| b.avg_ms.total_cmp(&a.avg_ms));

    match format {
        OutputFormat::Json => print_json(&patterns)?,
        OutputFormat::Table => {
            let rows = patterns
                .into_iter()
                .map(|p| QueryRow {
                    pattern: p.pattern,
                    count: p.count,
                    avg: format_ms(p.avg_ms),
                    indexes: p
                        .suggested_indexes
                        .map(|idx| idx.join(", "))
                        .unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            print_rows(rows, "No query patterns recorded");
        }
    }

    Ok(())
}

/// Show endpoint health as seen by the load balancer
pub async fn show_endpoints(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let endpoints = client.endpoints().await?;

    match format {
        OutputFormat::Json => print_json(&endpoints)?,
        OutputFormat::Table => {
            let rows = endpoints
                .into_iter()
                .map(|e| {
                    let success_rate = if e.total_requests > 0 {
                        e.successful_requests as f64 / e.total_requests as f64
                    } else {
                        0.0
                    };
                    EndpointRow {
                        endpoint: e.endpoint,
                        requests: e.total_requests,
                        success: format_percent(success_rate),
                        latency: format_ms(e.avg_response_time_ms),
                        score: color_score(e.health_score),
                    }
                })
                .collect();
            print_rows(rows, "No endpoints observed yet");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn alert(severity: &str) -> Alert {
        Alert {
            severity: severity.to_string(),
            kind: "latency".to_string(),
            endpoint: "GET /a".to_string(),
            message: String::new(),
            metrics: BTreeMap::new(),
            suggestion: String::new(),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_filter_alerts_by_minimum_severity() {
        let alerts = vec![alert("low"), alert("high"), alert("critical"), alert("medium")];
        let kept = filter_alerts(alerts, Some(Severity::High));
        let severities: Vec<_> = kept.iter().map(|a| a.severity.as_str()).collect();
        assert_eq!(severities, vec!["high", "critical"]);
    }

    #[test]
    fn test_filter_alerts_without_minimum_keeps_all() {
        let kept = filter_alerts(vec![alert("low"), alert("bogus")], None);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_unknown_severity_is_kept() {
        let kept = filter_alerts(vec![alert("bogus")], Some(Severity::Critical));
        assert_eq!(kept.len(), 1);
    }
}
