//! Recovery plans.

use serde::{Deserialize, Serialize};

/// Placeholder replaced by the backup id in step commands.
pub const BACKUP_ID_PLACEHOLDER: &str = "{backup_id}";

/// One step of a recovery plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryStep {
    /// Step id, unique within the plan.
    pub id: String,
    /// What the step does.
    pub description: String,
    /// Script dispatched to the gateway.
    pub command: String,
    /// 1-based position.
    pub order: u32,
    /// Whether a failure halts the plan.
    pub critical: bool,
}

impl RecoveryStep {
    /// Create a step.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        command: impl Into<String>,
        order: u32,
        critical: bool,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            command: command.into(),
            order,
            critical,
        }
    }
}

/// An ordered list of steps restoring a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryPlan {
    /// The backup being restored.
    pub backup_id: String,
    /// Steps, in any order; execution sorts by `order`.
    pub steps: Vec<RecoveryStep>,
}

impl RecoveryPlan {
    /// Create a plan from explicit steps.
    pub fn new(backup_id: impl Into<String>, steps: Vec<RecoveryStep>) -> Self {
        Self {
            backup_id: backup_id.into(),
            steps,
        }
    }

    /// Steps sorted by ascending order.
    pub fn ordered_steps(&self) -> Vec<&RecoveryStep> {
        let mut steps: Vec<&RecoveryStep> = self.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        steps
    }
}

/// Outcome of executing a recovery plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryResult {
    /// True iff no step failed.
    pub success: bool,
    /// Ids of steps that succeeded, in execution order.
    pub completed_steps: Vec<String>,
    /// Ids of steps that failed.
    pub failed_steps: Vec<String>,
    /// Ids of steps never attempted because a critical step failed.
    pub skipped_steps: Vec<String>,
    /// One message per failed step.
    pub errors: Vec<String>,
}

/// A step definition with a command template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTemplate {
    /// Step id.
    pub id: String,
    /// What the step does.
    pub description: String,
    /// Command with `{backup_id}` placeholders.
    pub command: String,
    /// Whether a failure halts the plan.
    pub critical: bool,
}

impl StepTemplate {
    fn new(id: &str, description: &str, command: &str, critical: bool) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            command: command.to_string(),
            critical,
        }
    }
}

/// Template from which recovery plans are built.
///
/// The default commands call stored procedures provisioned alongside the
/// backing store; deployments with different tooling supply their own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryTemplate {
    /// Steps in execution order.
    pub steps: Vec<StepTemplate>,
}

impl RecoveryTemplate {
    /// Instantiate the template for a backup.
    pub fn instantiate(&self, backup_id: &str) -> RecoveryPlan {
        let steps = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| {
                RecoveryStep::new(
                    step.id.clone(),
                    step.description.replace(BACKUP_ID_PLACEHOLDER, backup_id),
                    step.command.replace(BACKUP_ID_PLACEHOLDER, backup_id),
                    index as u32 + 1,
                    step.critical,
                )
            })
            .collect();
        RecoveryPlan::new(backup_id, steps)
    }
}

impl Default for RecoveryTemplate {
    fn default() -> Self {
        Self {
            steps: vec![
                StepTemplate::new(
                    "verify_integrity",
                    "Verify integrity of backup {backup_id}",
                    "SELECT ops_verify_backup('{backup_id}');",
                    true,
                ),
                StepTemplate::new(
                    "stop_services",
                    "Stop application services",
                    "SELECT ops_suspend_services();",
                    true,
                ),
                StepTemplate::new(
                    "restore_schema",
                    "Restore schema from backup {backup_id}",
                    "SELECT ops_restore_schema('{backup_id}');",
                    true,
                ),
                StepTemplate::new(
                    "restore_data",
                    "Restore data from backup {backup_id}",
                    "SELECT ops_restore_data('{backup_id}');",
                    true,
                ),
                StepTemplate::new(
                    "verify_data",
                    "Verify restored data against backup {backup_id}",
                    "SELECT ops_verify_data('{backup_id}');",
                    true,
                ),
                StepTemplate::new(
                    "restart_services",
                    "Restart application services",
                    "SELECT ops_resume_services();",
                    false,
                ),
            ],
        }
    }
}
