//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table, or a notice when there are none
pub fn print_rows<T: Tabled>(rows: Vec<T>, empty_message: &str) {
    if rows.is_empty() {
        print_warning(empty_message);
        return;
    }
    let count = rows.len();
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
    println!("\nTotal: {}", count);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format milliseconds with a unit that keeps the number short
pub fn format_ms(ms: f64) -> String {
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else if ms >= 1.0 {
        format!("{:.1}ms", ms)
    } else {
        format!("{:.0}µs", ms * 1000.0)
    }
}

/// Format a ratio in [0, 1] as a percentage
pub fn format_percent(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

/// Format a Unix millisecond timestamp as local time
pub fn format_timestamp_ms(ts: i64) -> String {
    match chrono::DateTime::from_timestamp_millis(ts) {
        Some(dt) => dt
            .with_timezone(&chrono::Local)
            .format("%Y-%m-%d %H:%M:%S")
            .to_string(),
        None => ts.to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "healthy" | "low" => status.green().to_string(),
        "degraded" | "medium" => status.yellow().to_string(),
        "high" => status.red().to_string(),
        "unhealthy" | "critical" => status.red().bold().to_string(),
        _ => status.to_string(),
    }
}

/// Color a health score: green when healthy, red when failing
pub fn color_score(score: f64) -> String {
    let formatted = format!("{:.2}", score);
    if score >= 0.8 {
        formatted.green().to_string()
    } else if score >= 0.5 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_ms_units() {
        assert_eq!(format_ms(2500.0), "2.50s");
        assert_eq!(format_ms(12.34), "12.3ms");
        assert_eq!(format_ms(0.25), "250µs");
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(0.876), "88%");
        assert_eq!(format_percent(0.0), "0%");
    }

    #[test]
    fn test_format_timestamp_invalid_falls_back() {
        assert_eq!(format_timestamp_ms(i64::MAX), i64::MAX.to_string());
    }
}
