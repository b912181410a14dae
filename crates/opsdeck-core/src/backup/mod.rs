//! Backup and recovery.
//!
//! Backups capture a manifest of the tables in the backing store and run a
//! pluggable [`BackupTransfer`]. Recovery plans are instantiated from a
//! [`RecoveryTemplate`] and executed one step at a time; a failed critical
//! step halts the plan.

pub mod health;
pub mod manager;
pub mod model;
pub mod recovery;
pub mod transfer;

pub use health::{assess_backups, BackupHealth, HealthStatus};
pub use manager::BackupManager;
pub use model::{Backup, BackupStatus};
pub use recovery::{
    RecoveryPlan, RecoveryResult, RecoveryStep, RecoveryTemplate, StepTemplate,
    BACKUP_ID_PLACEHOLDER,
};
pub use transfer::{
    BackupTransfer, SnapshotTransfer, DEFAULT_SNAPSHOT_COMMAND, TABLES_PLACEHOLDER,
};
