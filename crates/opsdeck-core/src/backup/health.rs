//! Backup health assessment.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Backup, BackupStatus};
use crate::config::BackupHealthThresholds;

/// Qualitative health of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No issues.
    Healthy,
    /// Some issues.
    Warning,
    /// Many issues, or a failed check.
    Critical,
}

impl HealthStatus {
    /// Map an issue count to a status: none healthy, one or two warning,
    /// three or more critical.
    pub fn from_issue_count(issues: usize) -> Self {
        match issues {
            0 => HealthStatus::Healthy,
            1..=2 => HealthStatus::Warning,
            _ => HealthStatus::Critical,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Warning => write!(f, "warning"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Result of the backup health check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupHealth {
    /// Overall status.
    pub status: HealthStatus,
    /// Problems found.
    pub issues: Vec<String>,
    /// Suggested actions.
    pub recommendations: Vec<String>,
}

/// Assess a set of backups at time `now`.
pub fn assess_backups(
    backups: &[Backup],
    now: DateTime<Utc>,
    thresholds: &BackupHealthThresholds,
) -> BackupHealth {
    let mut issues = Vec::new();
    let mut recommendations = Vec::new();

    let window_start = now - Duration::hours(thresholds.stale_after_hours);
    let recent = backups.iter().any(|b| {
        b.status == BackupStatus::Completed && b.completed_at.unwrap_or(b.timestamp) >= window_start
    });
    if !recent {
        issues.push(format!(
            "No completed backup in the last {} hours (stale backups)",
            thresholds.stale_after_hours
        ));
        recommendations.push("Create a fresh backup and verify the backup schedule".to_string());
    }

    let large = backups
        .iter()
        .filter(|b| b.size > thresholds.large_backup_bytes)
        .count();
    if large > 0 {
        issues.push(format!(
            "{} large backup(s) over {} bytes, consider archiving",
            large, thresholds.large_backup_bytes
        ));
        recommendations.push("Archive or prune large backups to cold storage".to_string());
    }

    if !backups.is_empty() {
        let failed = backups
            .iter()
            .filter(|b| b.status == BackupStatus::Failed)
            .count();
        let ratio = failed as f64 / backups.len() as f64;
        if ratio > thresholds.max_failure_ratio {
            issues.push(format!(
                "High failure rate: {:.0}% of backups failed",
                ratio * 100.0
            ));
            recommendations
                .push("Investigate failed backups and backing store capacity".to_string());
        }
    }

    BackupHealth {
        status: HealthStatus::from_issue_count(issues.len()),
        issues,
        recommendations,
    }
}
