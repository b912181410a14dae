//! Output formatters for reports, trends and alerts.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use opsdeck_core::{Alert, HealthReport, TrendPoint};

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a health report.
    fn format_report(&self, report: &HealthReport) -> String;

    /// Format trend history.
    fn format_trends(&self, points: &[TrendPoint]) -> String;

    /// Format a list of alerts.
    fn format_alerts(&self, alerts: &[Alert]) -> String;

    /// Format a simple message.
    fn format_message(&self, message: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_report(&self, report: &HealthReport) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Check", "Value"]);

        let m = &report.migrations;
        table.add_row(vec![
            Cell::new("status"),
            Cell::new(report.status.to_string()),
        ]);
        table.add_row(vec![
            Cell::new("generated"),
            Cell::new(report.generated_at.to_rfc3339()),
        ]);
        table.add_row(vec![
            Cell::new("migrations"),
            Cell::new(format!(
                "{} total, {} pending, {} completed, {} failed, {} rolled back",
                m.total, m.pending, m.completed, m.failed, m.rolled_back
            )),
        ]);
        table.add_row(vec![
            Cell::new("backups"),
            Cell::new(report.backups.status.to_string()),
        ]);
        for issue in &report.backups.issues {
            table.add_row(vec![Cell::new(""), Cell::new(issue)]);
        }
        table.add_row(vec![
            Cell::new("query time"),
            Cell::new(format!("{:.1}ms", report.performance.query_time)),
        ]);
        table.add_row(vec![
            Cell::new("cache hit rate"),
            Cell::new(format!("{:.1}%", report.performance.cache_hit_rate * 100.0)),
        ]);
        table.add_row(vec![
            Cell::new("throughput"),
            Cell::new(format!("{:.2}/s", report.performance.throughput)),
        ]);
        table.add_row(vec![
            Cell::new("connections"),
            Cell::new(optional(report.database.connections)),
        ]);
        table.add_row(vec![
            Cell::new("tables"),
            Cell::new(optional(report.database.table_count)),
        ]);

        let mut output = table.to_string();
        if !report.alerts.is_empty() {
            output.push_str("\n\nAlerts:");
            for alert in &report.alerts {
                output.push_str(&format!("\n  - {}", alert));
            }
        }
        if !report.degraded.is_empty() {
            output.push_str("\n\nDegraded checks:");
            for check in &report.degraded {
                output.push_str(&format!("\n  - {}", check));
            }
        }
        output
    }

    fn format_trends(&self, points: &[TrendPoint]) -> String {
        if points.is_empty() {
            return "No trend history".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec![
            "timestamp",
            "status",
            "query ms",
            "hit rate",
            "throughput",
            "connections",
            "alerts",
        ]);
        for point in points {
            table.add_row(vec![
                Cell::new(point.timestamp.format("%Y-%m-%d %H:%M:%S")),
                Cell::new(point.status.to_string()),
                Cell::new(format!("{:.1}", point.query_time)),
                Cell::new(format!("{:.2}", point.cache_hit_rate)),
                Cell::new(format!("{:.2}", point.throughput)),
                Cell::new(optional(point.connections)),
                Cell::new(point.alert_count),
            ]);
        }
        table.to_string()
    }

    fn format_alerts(&self, alerts: &[Alert]) -> String {
        if alerts.is_empty() {
            return "No alerts".to_string();
        }

        let mut table = Table::new();
        table.set_header(vec!["id", "severity", "message", "seen", "last seen", "state"]);
        for alert in alerts {
            table.add_row(vec![
                Cell::new(&alert.id),
                Cell::new(alert.severity.to_string()),
                Cell::new(&alert.message),
                Cell::new(alert.occurrences),
                Cell::new(alert.last_seen.format("%Y-%m-%d %H:%M:%S")),
                Cell::new(if alert.resolved { "resolved" } else { "active" }),
            ]);
        }
        table.to_string()
    }

    fn format_message(&self, message: &str) -> String {
        message.to_string()
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_report(&self, report: &HealthReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_trends(&self, points: &[TrendPoint]) -> String {
        serde_json::to_string_pretty(points).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_alerts(&self, alerts: &[Alert]) -> String {
        serde_json::to_string_pretty(alerts).unwrap_or_else(|_| "[]".to_string())
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({
            "message": message
        })
        .to_string()
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use opsdeck_core::{AlertSeverity, HealthStatus};

    fn alert(resolved: bool) -> Alert {
        Alert {
            id: "alr_01".to_string(),
            message: "High connection count: 120".to_string(),
            severity: AlertSeverity::Warning,
            first_seen: Utc::now(),
            last_seen: Utc::now(),
            occurrences: 3,
            resolved,
            resolved_at: None,
        }
    }

    fn point() -> TrendPoint {
        TrendPoint {
            timestamp: Utc::now(),
            status: HealthStatus::Warning,
            query_time: 12.5,
            cache_hit_rate: 0.75,
            throughput: 4.0,
            connections: None,
            alert_count: 1,
        }
    }

    #[test]
    fn test_table_alerts() {
        let output = TableFormatter.format_alerts(&[alert(false), alert(true)]);
        assert!(output.contains("alr_01"));
        assert!(output.contains("active"));
        assert!(output.contains("resolved"));
        assert_eq!(TableFormatter.format_alerts(&[]), "No alerts");
    }

    #[test]
    fn test_table_trends_missing_connections() {
        let output = TableFormatter.format_trends(&[point()]);
        assert!(output.contains("warning"));
        assert!(output.contains("12.5"));
        assert!(output.contains(" - "));
    }

    #[test]
    fn test_json_trends_camel_case() {
        let output = JsonFormatter.format_trends(&[point()]);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed[0]["cacheHitRate"], 0.75);
        assert_eq!(parsed[0]["alertCount"], 1);
    }

    #[test]
    fn test_json_message() {
        assert_eq!(JsonFormatter.format_message("ok"), r#"{"message":"ok"}"#);
    }
}
