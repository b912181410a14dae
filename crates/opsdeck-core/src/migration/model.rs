//! Migration records, history events and execution reports.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Baseline cost of one script line.
const MS_PER_LINE: f64 = 100.0;

/// Weight applied to scripts that create tables.
const CREATE_TABLE_WEIGHT: f64 = 2.0;

/// Weight applied to scripts that alter tables.
const ALTER_TABLE_WEIGHT: f64 = 1.5;

/// Lifecycle state of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Defined, not yet executed.
    Pending,
    /// Up or down script in flight.
    Running,
    /// Up script applied.
    Completed,
    /// Up or down script failed; needs operator intervention.
    Failed,
    /// Down script applied after completion.
    RolledBack,
}

impl std::fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationStatus::Pending => write!(f, "pending"),
            MigrationStatus::Running => write!(f, "running"),
            MigrationStatus::Completed => write!(f, "completed"),
            MigrationStatus::Failed => write!(f, "failed"),
            MigrationStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

/// A named, versioned schema-change unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Migration {
    /// Unique id.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// What the migration changes.
    pub description: String,
    /// Time-derived, monotonic version.
    pub version: u64,
    /// Script applying the change.
    pub up_script: String,
    /// Script reverting the change.
    pub down_script: String,
    /// Ids of migrations that must be completed first.
    pub dependencies: Vec<String>,
    /// Current status.
    pub status: MigrationStatus,
    /// SHA-256 of the script pair.
    pub checksum: String,
    /// Heuristic duration estimate in milliseconds.
    pub estimated_duration_ms: u64,
    /// When the migration was defined.
    pub created_at: DateTime<Utc>,
    /// When the up script last completed.
    pub executed_at: Option<DateTime<Utc>>,
    /// When the down script completed.
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// Error from the last failed execution or rollback.
    pub last_error: Option<String>,
}

impl Migration {
    /// Estimated duration as a [`Duration`].
    pub fn estimated_duration(&self) -> Duration {
        Duration::from_millis(self.estimated_duration_ms)
    }

    /// Whether this migration can be executed, ignoring dependencies.
    pub fn is_pending(&self) -> bool {
        self.status == MigrationStatus::Pending
    }
}

/// Checksum of an up/down script pair.
///
/// The up script's length is hashed ahead of the content so that moving
/// text across the boundary changes the checksum.
pub fn checksum(up_script: &str, down_script: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((up_script.len() as u64).to_be_bytes());
    hasher.update(up_script.as_bytes());
    hasher.update(down_script.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Estimate how long a script takes to run.
pub fn estimate_duration(script: &str) -> Duration {
    let lines = script.lines().filter(|l| !l.trim().is_empty()).count().max(1);
    let normalized = normalize_sql(script);

    let weight = if normalized.contains("CREATE TABLE") {
        CREATE_TABLE_WEIGHT
    } else if normalized.contains("ALTER TABLE") {
        ALTER_TABLE_WEIGHT
    } else {
        1.0
    };

    Duration::from_millis((lines as f64 * MS_PER_LINE * weight).ceil() as u64)
}

/// Uppercase a script and collapse whitespace runs for keyword matching.
pub(crate) fn normalize_sql(script: &str) -> String {
    script
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Aggregate counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationSummary {
    /// All known migrations.
    pub total: usize,
    /// Migrations not yet executed.
    pub pending: usize,
    /// Migrations applied.
    pub completed: usize,
    /// Migrations that failed.
    pub failed: usize,
    /// Migrations rolled back.
    pub rolled_back: usize,
}

/// What happened to a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationAction {
    /// Up script applied.
    Executed,
    /// Up script failed.
    ExecutionFailed,
    /// Down script applied.
    RolledBack,
    /// Down script failed.
    RollbackFailed,
    /// Operator returned a failed migration to pending.
    Reset,
    /// Process stopped while the migration was running.
    Interrupted,
}

/// One entry in the append-only migration history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationEvent {
    /// The migration this event belongs to.
    pub migration_id: String,
    /// Migration name at the time of the event.
    pub name: String,
    /// What happened.
    pub action: MigrationAction,
    /// When it happened.
    pub at: DateTime<Utc>,
    /// Wall-clock time spent in the gateway, if any.
    pub elapsed_ms: Option<u64>,
    /// Error message for failures.
    pub error: Option<String>,
}

/// Outcome of an execute or rollback call that passed its preconditions.
#[derive(Debug)]
pub struct ExecutionReport {
    /// The migration acted on.
    pub migration_id: String,
    /// Status after the call.
    pub status: MigrationStatus,
    /// Wall-clock duration of the gateway round trip.
    pub elapsed: Duration,
    /// The gateway or cancellation error, if the call failed.
    pub error: Option<Error>,
}

impl ExecutionReport {
    /// Check if the script was applied.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_stable() {
        let a = checksum("CREATE TABLE t (id int);", "DROP TABLE t;");
        let b = checksum("CREATE TABLE t (id int);", "DROP TABLE t;");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_checksum_differs_on_any_change() {
        let base = checksum("CREATE TABLE t (id int);", "DROP TABLE t;");
        assert_ne!(base, checksum("CREATE TABLE t (id bigint);", "DROP TABLE t;"));
        assert_ne!(base, checksum("CREATE TABLE t (id int);", "DROP TABLE IF EXISTS t;"));
        // Same concatenation, different split.
        assert_ne!(checksum("ab", "c"), checksum("a", "bc"));
    }

    #[test]
    fn test_estimate_duration_weights() {
        let create = "CREATE TABLE ideas (\n  id uuid primary key\n);";
        let alter = "ALTER TABLE ideas\n  ADD COLUMN tags text[]\n;";
        let plain = "UPDATE ideas SET tags = '{}'\nWHERE tags IS NULL\n;";

        assert_eq!(estimate_duration(create), Duration::from_millis(600));
        assert_eq!(estimate_duration(alter), Duration::from_millis(450));
        assert_eq!(estimate_duration(plain), Duration::from_millis(300));
    }

    #[test]
    fn test_estimate_is_case_insensitive() {
        assert_eq!(
            estimate_duration("create   table x (id int)"),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&MigrationStatus::RolledBack).unwrap(),
            "\"rolled_back\""
        );
        assert_eq!(MigrationStatus::RolledBack.to_string(), "rolled_back");
    }
}
