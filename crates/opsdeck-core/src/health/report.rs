//! Dashboard report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alerts::AlertSeverity;
use crate::backup::{BackupHealth, HealthStatus};
use crate::migration::MigrationSummary;

/// Query and cache performance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    /// Average query time in milliseconds.
    pub query_time: f64,
    /// Cache hit rate.
    pub cache_hit_rate: f64,
    /// Queries per second.
    pub throughput: f64,
}

/// Metrics reported by the backing store.
///
/// Fields are `None` when their sub-check failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseReport {
    /// Active connections.
    pub connections: Option<u64>,
    /// Number of user tables.
    pub table_count: Option<usize>,
    /// Sum of table sizes in bytes.
    pub total_bytes: Option<u64>,
}

/// One poll cycle's aggregate view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// When the report was built.
    pub generated_at: DateTime<Utc>,
    /// Overall status.
    pub status: HealthStatus,
    /// Migration counts.
    pub migrations: MigrationSummary,
    /// Backup health.
    pub backups: BackupHealth,
    /// Query and cache performance.
    pub performance: PerformanceReport,
    /// Backing store metrics.
    pub database: DatabaseReport,
    /// De-duplicated alert messages in rule order.
    pub alerts: Vec<String>,
    /// Sub-checks that failed or timed out.
    pub degraded: Vec<String>,
}

/// An alert produced by a threshold rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertCandidate {
    /// Alert text.
    pub message: String,
    /// Severity.
    pub severity: AlertSeverity,
}

/// Overall status from alerts and degraded checks.
///
/// Any critical alert makes the report critical; any other alert or a
/// degraded sub-check makes it a warning.
pub fn overall_status(alerts: &[AlertCandidate], degraded: &[String]) -> HealthStatus {
    if alerts.iter().any(|a| a.severity == AlertSeverity::Critical) {
        HealthStatus::Critical
    } else if !alerts.is_empty() || !degraded.is_empty() {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}
