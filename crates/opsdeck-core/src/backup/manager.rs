//! Backup and recovery manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{info, warn};

use super::health::{assess_backups, BackupHealth};
use super::model::{Backup, BackupStatus};
use super::recovery::{RecoveryPlan, RecoveryResult, RecoveryTemplate};
use super::transfer::{BackupTransfer, SnapshotTransfer};
use crate::config::{BackupHealthThresholds, OpsConfig};
use crate::error::Error;
use crate::gateway::StoreGateway;
use crate::ids::generate_id;
use crate::store::{Collection, StateStore, BACKUPS_TREE};
use crate::task::{dispatch, CancellationToken};

/// Creates backups, builds and runs recovery plans, and reports backup
/// health.
pub struct BackupManager {
    gateway: Arc<dyn StoreGateway>,
    transfer: Arc<dyn BackupTransfer>,
    backups: RwLock<HashMap<String, Backup>>,
    records: Collection,
    template: RecoveryTemplate,
    thresholds: BackupHealthThresholds,
    backup_timeout: Duration,
    step_timeout: Duration,
}

impl BackupManager {
    /// Open the manager, loading persisted backups.
    ///
    /// Backups left `in_progress` by a previous process are marked failed.
    pub fn open(
        store: &StateStore,
        gateway: Arc<dyn StoreGateway>,
        config: &OpsConfig,
    ) -> Result<Self, Error> {
        let records = store.collection(BACKUPS_TREE)?;

        let mut backups = HashMap::new();
        for mut backup in records.load_all::<Backup>()? {
            if backup.status == BackupStatus::InProgress {
                warn!(backup_id = %backup.id, "backup was in progress at shutdown, marking failed");
                backup.fail("interrupted before completion");
                records.put(&backup.id, &backup)?;
            }
            backups.insert(backup.id.clone(), backup);
        }

        info!(count = backups.len(), "backups loaded");

        Ok(Self {
            transfer: Arc::new(SnapshotTransfer::new(Arc::clone(&gateway))),
            gateway,
            backups: RwLock::new(backups),
            records,
            template: RecoveryTemplate::default(),
            thresholds: config.backup_health.clone(),
            backup_timeout: config.backup_timeout,
            step_timeout: config.recovery_step_timeout,
        })
    }

    /// Replace the transfer strategy.
    pub fn with_transfer(mut self, transfer: Arc<dyn BackupTransfer>) -> Self {
        self.transfer = transfer;
        self
    }

    /// Replace the recovery template.
    pub fn with_template(mut self, template: RecoveryTemplate) -> Self {
        self.template = template;
        self
    }

    /// Create a backup of every table currently in the backing store.
    ///
    /// Failing to list tables is returned as an error and records nothing.
    /// Once the backup is recorded, transfer failures, timeouts and
    /// cancellation leave it `failed` and are reported on the returned
    /// record.
    pub async fn create_backup(
        &self,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<Backup, Error> {
        let gateway = Arc::clone(&self.gateway);
        let tables = dispatch(
            async move { gateway.list_tables().await },
            self.backup_timeout,
            cancel,
        )
        .await?;

        let mut backup = Backup::new(
            generate_id("bak"),
            description,
            tables.into_iter().map(|t| t.name).collect(),
        );
        self.records.put(&backup.id, &backup)?;
        self.backups.write().insert(backup.id.clone(), backup.clone());

        info!(
            backup_id = %backup.id,
            tables = backup.tables.len(),
            "backup started"
        );

        let transfer = Arc::clone(&self.transfer);
        let snapshot = backup.clone();
        let result = dispatch(
            async move { transfer.transfer(&snapshot).await },
            self.backup_timeout,
            cancel,
        )
        .await;

        match result {
            Ok(size) => {
                backup.complete(size);
                info!(backup_id = %backup.id, size, "backup completed");
            }
            Err(e) => {
                warn!(backup_id = %backup.id, error = %e, "backup failed");
                backup.fail(e.to_string());
            }
        }

        self.backups.write().insert(backup.id.clone(), backup.clone());
        self.records.put(&backup.id, &backup)?;
        Ok(backup)
    }

    /// All backups, newest first.
    pub fn list_backups(&self) -> Vec<Backup> {
        let mut all: Vec<Backup> = self.backups.read().values().cloned().collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        all
    }

    /// Look up a backup.
    pub fn get_backup(&self, backup_id: &str) -> Option<Backup> {
        self.backups.read().get(backup_id).cloned()
    }

    /// Delete a backup record. Returns `false` if it did not exist.
    pub fn delete_backup(&self, backup_id: &str) -> Result<bool, Error> {
        let mut backups = self.backups.write();
        let Some(backup) = backups.get(backup_id) else {
            return Ok(false);
        };
        if backup.status == BackupStatus::InProgress {
            return Err(Error::invalid_state("delete", backup_id, backup.status));
        }

        self.records.remove(backup_id)?;
        backups.remove(backup_id);
        info!(backup_id, "backup deleted");
        Ok(true)
    }

    /// Build the recovery plan for a completed backup.
    pub fn build_recovery_plan(&self, backup_id: &str) -> Result<RecoveryPlan, Error> {
        let backups = self.backups.read();
        let backup = backups
            .get(backup_id)
            .ok_or_else(|| Error::not_found("backup", backup_id))?;
        if backup.status != BackupStatus::Completed {
            return Err(Error::invalid_state("recover from", backup_id, backup.status));
        }
        Ok(self.template.instantiate(backup_id))
    }

    /// Execute a recovery plan step by step.
    ///
    /// Steps run sequentially in ascending order. A failed critical step
    /// halts the plan and the remaining steps are reported as skipped.
    /// Cancellation fails the step in flight and halts.
    pub async fn execute_recovery_plan(
        &self,
        plan: &RecoveryPlan,
        cancel: &CancellationToken,
    ) -> RecoveryResult {
        let mut result = RecoveryResult::default();
        let steps = plan.ordered_steps();

        info!(backup_id = %plan.backup_id, steps = steps.len(), "recovery started");

        let mut halted = false;
        for step in steps {
            if halted {
                result.skipped_steps.push(step.id.clone());
                continue;
            }

            let gateway = Arc::clone(&self.gateway);
            let command = step.command.clone();
            let outcome = dispatch(
                async move { gateway.execute_script(&command).await },
                self.step_timeout,
                cancel,
            )
            .await;

            match outcome {
                Ok(()) => {
                    info!(backup_id = %plan.backup_id, step = %step.id, "recovery step completed");
                    result.completed_steps.push(step.id.clone());
                }
                Err(e) => {
                    warn!(
                        backup_id = %plan.backup_id,
                        step = %step.id,
                        critical = step.critical,
                        error = %e,
                        "recovery step failed"
                    );
                    result.failed_steps.push(step.id.clone());
                    result.errors.push(format!("{}: {}", step.id, e));
                    if step.critical || matches!(e, Error::Cancelled) {
                        halted = true;
                    }
                }
            }
        }

        result.success = result.failed_steps.is_empty();
        info!(
            backup_id = %plan.backup_id,
            success = result.success,
            completed = result.completed_steps.len(),
            failed = result.failed_steps.len(),
            skipped = result.skipped_steps.len(),
            "recovery finished"
        );
        result
    }

    /// Assess the health of the backup set.
    pub fn check_backup_health(&self) -> BackupHealth {
        let backups: Vec<Backup> = self.backups.read().values().cloned().collect();
        assess_backups(&backups, Utc::now(), &self.thresholds)
    }
}
