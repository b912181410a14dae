//! Migration orchestrator.
//!
//! Dependencies are verified at execution time, not scheduled: callers
//! supply migration ids in an order they believe is valid and the
//! orchestrator refuses to run anything whose dependencies have not
//! completed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::model::{
    checksum, estimate_duration, ExecutionReport, Migration, MigrationAction, MigrationEvent,
    MigrationStatus, MigrationSummary,
};
use super::risk::{self, PlanContext, RiskAssessment, RiskRule};
use crate::config::OpsConfig;
use crate::error::Error;
use crate::gateway::StoreGateway;
use crate::ids::{generate_id, next_version};
use crate::store::{Collection, StateStore, HISTORY_TREE, MIGRATIONS_TREE};
use crate::task::{dispatch, CancellationToken};

/// Checklist attached to every plan.
const TESTING_CHECKLIST: &[&str] = &[
    "Apply the plan to a staging copy of production data",
    "Compare row counts of affected tables before and after",
    "Exercise application read and write paths touching changed tables",
    "Run the rollback script on staging, then re-apply the plan",
    "Confirm query latency on affected tables stays within baseline",
    "Take a fresh backup immediately before the production deployment",
];

/// Which script a gateway round trip runs.
#[derive(Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// An ordered bundle of migrations chosen for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    /// Deployment name.
    pub name: String,
    /// What the deployment does.
    pub description: String,
    /// Migrations in execution order.
    pub migrations: Vec<Migration>,
    /// Sum of the migrations' estimates in milliseconds.
    pub estimated_duration_ms: u64,
    /// Risk classification.
    pub risk: RiskAssessment,
    /// Down scripts in reverse order.
    pub rollback_script: String,
    /// Checks to run before and after deployment.
    pub testing_checklist: Vec<String>,
}

/// Defines, executes and rolls back migrations.
pub struct MigrationOrchestrator {
    gateway: Arc<dyn StoreGateway>,
    migrations: RwLock<HashMap<String, Migration>>,
    records: Collection,
    history: Collection,
    rules: Vec<Box<dyn RiskRule>>,
    script_timeout: Duration,
}

impl MigrationOrchestrator {
    /// Open the orchestrator, loading persisted migrations.
    ///
    /// Migrations left `running` by a previous process are marked failed.
    pub fn open(
        store: &StateStore,
        gateway: Arc<dyn StoreGateway>,
        config: &OpsConfig,
    ) -> Result<Self, Error> {
        let records = store.collection(MIGRATIONS_TREE)?;
        let history = store.collection(HISTORY_TREE)?;

        let mut migrations = HashMap::new();
        for mut migration in records.load_all::<Migration>()? {
            if migration.status == MigrationStatus::Running {
                warn!(
                    migration_id = %migration.id,
                    name = %migration.name,
                    "migration was running at shutdown, marking failed"
                );
                migration.status = MigrationStatus::Failed;
                migration.last_error = Some("interrupted before completion".to_string());
                records.put(&migration.id, &migration)?;
                history.append(&MigrationEvent {
                    migration_id: migration.id.clone(),
                    name: migration.name.clone(),
                    action: MigrationAction::Interrupted,
                    at: Utc::now(),
                    elapsed_ms: None,
                    error: migration.last_error.clone(),
                })?;
            }
            migrations.insert(migration.id.clone(), migration);
        }

        info!(count = migrations.len(), "migrations loaded");

        Ok(Self {
            gateway,
            migrations: RwLock::new(migrations),
            records,
            history,
            rules: risk::default_rules(&config.risk),
            script_timeout: config.script_timeout,
        })
    }

    /// Replace the risk rules used by [`plan`](Self::plan).
    pub fn with_rules(mut self, rules: Vec<Box<dyn RiskRule>>) -> Self {
        self.rules = rules;
        self
    }

    /// Define a new pending migration.
    pub fn define(
        &self,
        name: &str,
        description: &str,
        up_script: &str,
        down_script: &str,
        dependencies: Vec<String>,
    ) -> Result<Migration, Error> {
        if name.trim().is_empty() {
            return Err(Error::Validation("migration name is empty".to_string()));
        }
        if up_script.trim().is_empty() {
            return Err(Error::Validation(format!("migration {} has an empty up script", name)));
        }

        let mut migrations = self.migrations.write();
        if let Some(missing) = dependencies.iter().find(|d| !migrations.contains_key(d.as_str())) {
            return Err(Error::not_found("migration", missing.clone()));
        }

        let migration = Migration {
            id: generate_id("mig"),
            name: name.to_string(),
            description: description.to_string(),
            version: next_version(),
            up_script: up_script.to_string(),
            down_script: down_script.to_string(),
            dependencies,
            status: MigrationStatus::Pending,
            checksum: checksum(up_script, down_script),
            estimated_duration_ms: estimate_duration(up_script).as_millis() as u64,
            created_at: Utc::now(),
            executed_at: None,
            rolled_back_at: None,
            last_error: None,
        };

        self.records.put(&migration.id, &migration)?;
        migrations.insert(migration.id.clone(), migration.clone());

        info!(
            migration_id = %migration.id,
            name = %migration.name,
            version = migration.version,
            estimated_ms = migration.estimated_duration_ms,
            "migration defined"
        );
        Ok(migration)
    }

    /// Execute a pending migration's up script.
    ///
    /// Precondition failures are returned as errors without touching
    /// state. Gateway failures, timeouts and cancellation leave the
    /// migration `failed` and are reported in the returned report.
    pub async fn execute(
        &self,
        migration_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport, Error> {
        let script = self.begin(migration_id, Direction::Up)?;
        self.run(migration_id, script, Direction::Up, cancel).await
    }

    /// Execute a completed migration's down script.
    ///
    /// A failed rollback leaves the migration `failed`, not `completed`.
    pub async fn rollback(
        &self,
        migration_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport, Error> {
        let script = self.begin(migration_id, Direction::Down)?;
        self.run(migration_id, script, Direction::Down, cancel).await
    }

    /// Return a failed migration to `pending` after operator intervention.
    pub fn reset(&self, migration_id: &str) -> Result<Migration, Error> {
        let mut migrations = self.migrations.write();
        let migration = migrations
            .get_mut(migration_id)
            .ok_or_else(|| Error::not_found("migration", migration_id))?;

        if migration.status != MigrationStatus::Failed {
            return Err(Error::invalid_state("reset", migration_id, migration.status));
        }

        let mut updated = migration.clone();
        updated.status = MigrationStatus::Pending;
        updated.last_error = None;
        self.records.put(&updated.id, &updated)?;
        *migration = updated.clone();

        self.history.append(&MigrationEvent {
            migration_id: updated.id.clone(),
            name: updated.name.clone(),
            action: MigrationAction::Reset,
            at: Utc::now(),
            elapsed_ms: None,
            error: None,
        })?;

        info!(migration_id, "migration reset to pending");
        Ok(updated)
    }

    /// Validate preconditions and mark the migration running.
    fn begin(&self, migration_id: &str, direction: Direction) -> Result<String, Error> {
        let mut migrations = self.migrations.write();
        let migration = migrations
            .get(migration_id)
            .ok_or_else(|| Error::not_found("migration", migration_id))?;

        match direction {
            Direction::Up => {
                if migration.status != MigrationStatus::Pending {
                    return Err(Error::invalid_state("execute", migration_id, migration.status));
                }
                for dependency_id in &migration.dependencies {
                    let status = migrations.get(dependency_id).map(|d| d.status);
                    if status != Some(MigrationStatus::Completed) {
                        return Err(Error::Dependency {
                            migration_id: migration_id.to_string(),
                            dependency_id: dependency_id.clone(),
                            status: status
                                .map(|s| s.to_string())
                                .unwrap_or_else(|| "missing".to_string()),
                        });
                    }
                }
            }
            Direction::Down => {
                if migration.status != MigrationStatus::Completed {
                    return Err(Error::invalid_state("roll back", migration_id, migration.status));
                }
            }
        }

        let mut updated = migration.clone();
        updated.status = MigrationStatus::Running;
        self.records.put(&updated.id, &updated)?;

        let script = match direction {
            Direction::Up => updated.up_script.clone(),
            Direction::Down => updated.down_script.clone(),
        };
        migrations.insert(updated.id.clone(), updated);
        Ok(script)
    }

    /// Run a script through the gateway and record the outcome.
    async fn run(
        &self,
        migration_id: &str,
        script: String,
        direction: Direction,
        cancel: &CancellationToken,
    ) -> Result<ExecutionReport, Error> {
        let gateway = Arc::clone(&self.gateway);
        let started = Instant::now();
        let result = dispatch(
            async move { gateway.execute_script(&script).await },
            self.script_timeout,
            cancel,
        )
        .await;
        let elapsed = started.elapsed();

        let mut migrations = self.migrations.write();
        let migration = migrations
            .get_mut(migration_id)
            .ok_or_else(|| Error::not_found("migration", migration_id))?;

        let mut updated = migration.clone();
        let now = Utc::now();
        let action = match (&result, direction) {
            (Ok(()), Direction::Up) => {
                updated.status = MigrationStatus::Completed;
                updated.executed_at = Some(now);
                updated.last_error = None;
                MigrationAction::Executed
            }
            (Ok(()), Direction::Down) => {
                updated.status = MigrationStatus::RolledBack;
                updated.rolled_back_at = Some(now);
                updated.last_error = None;
                MigrationAction::RolledBack
            }
            (Err(e), direction) => {
                updated.status = MigrationStatus::Failed;
                updated.last_error = Some(e.to_string());
                match direction {
                    Direction::Up => MigrationAction::ExecutionFailed,
                    Direction::Down => MigrationAction::RollbackFailed,
                }
            }
        };

        // The outcome lands in memory even if persisting it fails, so the
        // unit never stays `running` in this process.
        *migration = updated.clone();
        drop(migrations);
        self.records.put(&updated.id, &updated)?;

        self.history.append(&MigrationEvent {
            migration_id: updated.id.clone(),
            name: updated.name.clone(),
            action,
            at: now,
            elapsed_ms: Some(elapsed.as_millis() as u64),
            error: updated.last_error.clone(),
        })?;

        match &result {
            Ok(()) => info!(
                migration_id,
                name = %updated.name,
                status = %updated.status,
                elapsed_ms = elapsed.as_millis() as u64,
                "migration script applied"
            ),
            Err(e) => warn!(
                migration_id,
                name = %updated.name,
                error = %e,
                elapsed_ms = elapsed.as_millis() as u64,
                "migration script failed"
            ),
        }

        Ok(ExecutionReport {
            migration_id: updated.id,
            status: updated.status,
            elapsed,
            error: result.err(),
        })
    }

    /// Build a deployment plan from migrations in the given order.
    pub fn plan(
        &self,
        name: &str,
        description: &str,
        migration_ids: &[String],
    ) -> Result<MigrationPlan, Error> {
        let migrations = self.migrations.read();

        let selected = migration_ids
            .iter()
            .map(|id| {
                migrations
                    .get(id)
                    .cloned()
                    .ok_or_else(|| Error::not_found("migration", id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let total_duration: Duration = selected.iter().map(Migration::estimated_duration).sum();
        let roots: Vec<&str> = migration_ids.iter().map(String::as_str).collect();
        let dependency_depth = risk::dependency_depth(&roots, &migrations);
        drop(migrations);

        let risk = risk::assess(
            &self.rules,
            &PlanContext {
                migrations: &selected,
                total_duration,
                dependency_depth,
            },
        );

        let rollback_script = rollback_script(name, &selected);

        Ok(MigrationPlan {
            name: name.to_string(),
            description: description.to_string(),
            estimated_duration_ms: total_duration.as_millis() as u64,
            risk,
            rollback_script,
            testing_checklist: TESTING_CHECKLIST.iter().map(|s| s.to_string()).collect(),
            migrations: selected,
        })
    }

    /// Aggregate counts by status.
    pub fn status(&self) -> MigrationSummary {
        let migrations = self.migrations.read();
        let mut summary = MigrationSummary {
            total: migrations.len(),
            ..Default::default()
        };
        for migration in migrations.values() {
            match migration.status {
                MigrationStatus::Pending => summary.pending += 1,
                MigrationStatus::Completed => summary.completed += 1,
                MigrationStatus::Failed => summary.failed += 1,
                MigrationStatus::RolledBack => summary.rolled_back += 1,
                MigrationStatus::Running => {}
            }
        }
        summary
    }

    /// Look up a migration.
    pub fn get(&self, migration_id: &str) -> Option<Migration> {
        self.migrations.read().get(migration_id).cloned()
    }

    /// All migrations ordered by version.
    pub fn list(&self) -> Vec<Migration> {
        let mut all: Vec<Migration> = self.migrations.read().values().cloned().collect();
        all.sort_by_key(|m| m.version);
        all
    }

    /// The append-only history, oldest first.
    pub fn history(&self) -> Result<Vec<MigrationEvent>, Error> {
        self.history.load_all()
    }

    /// Check whether the scripts on hand still match a stored migration.
    pub fn verify_checksum(
        &self,
        migration_id: &str,
        up_script: &str,
        down_script: &str,
    ) -> Result<bool, Error> {
        let migrations = self.migrations.read();
        let migration = migrations
            .get(migration_id)
            .ok_or_else(|| Error::not_found("migration", migration_id))?;
        Ok(migration.checksum == checksum(up_script, down_script))
    }
}

fn rollback_script(plan_name: &str, migrations: &[Migration]) -> String {
    let mut script = format!(
        "-- Rollback for plan: {}\n-- Generated at {}\n",
        plan_name,
        Utc::now().to_rfc3339()
    );
    for migration in migrations.iter().rev() {
        script.push_str(&format!(
            "\n-- Rollback: {} ({})\n{}\n",
            migration.name,
            migration.id,
            migration.down_script.trim_end()
        ));
    }
    script
}
