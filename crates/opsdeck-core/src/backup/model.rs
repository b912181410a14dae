//! Backup records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    /// Transfer running.
    InProgress,
    /// Transfer finished.
    Completed,
    /// Transfer failed or was interrupted.
    Failed,
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStatus::InProgress => write!(f, "in_progress"),
            BackupStatus::Completed => write!(f, "completed"),
            BackupStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A point-in-time snapshot descriptor.
///
/// The id and table manifest are fixed at creation, even when the
/// transfer later fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    /// Unique id.
    pub id: String,
    /// When the backup was started.
    pub timestamp: DateTime<Utc>,
    /// Size in bytes, known once completed.
    pub size: u64,
    /// Current status.
    pub status: BackupStatus,
    /// Operator-supplied description.
    pub description: String,
    /// Tables captured by this backup.
    pub tables: Vec<String>,
    /// When the backup left `in_progress`.
    pub completed_at: Option<DateTime<Utc>>,
    /// Why the transfer failed.
    pub error: Option<String>,
}

impl Backup {
    /// Create an in-progress backup.
    pub fn new(id: impl Into<String>, description: impl Into<String>, tables: Vec<String>) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            size: 0,
            status: BackupStatus::InProgress,
            description: description.into(),
            tables,
            completed_at: None,
            error: None,
        }
    }

    /// Mark the transfer as finished.
    pub fn complete(&mut self, size: u64) {
        self.status = BackupStatus::Completed;
        self.size = size;
        self.completed_at = Some(Utc::now());
    }

    /// Mark the transfer as failed.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = BackupStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Check if the backup has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status != BackupStatus::InProgress
    }
}
