//! Schema migration orchestration.
//!
//! This module provides:
//! - Migration definitions with content checksums and duration estimates
//! - Dependency-checked execution and rollback through the gateway
//! - Deployment plans with pluggable risk assessment
//! - An append-only, persisted history of every transition
//!
//! # Example
//!
//! ```ignore
//! use opsdeck_core::migration::MigrationOrchestrator;
//! use opsdeck_core::task::CancellationToken;
//!
//! let m1 = orchestrator.define("projects", "", up, down, vec![])?;
//! let plan = orchestrator.plan("launch", "initial schema", &[m1.id.clone()])?;
//! println!("risk: {}", plan.risk.level);
//!
//! let report = orchestrator.execute(&m1.id, &CancellationToken::new()).await?;
//! assert!(report.is_success());
//! ```

pub mod model;
pub mod orchestrator;
pub mod risk;

pub use model::{
    checksum, estimate_duration, ExecutionReport, Migration, MigrationAction, MigrationEvent,
    MigrationStatus, MigrationSummary,
};
pub use orchestrator::{MigrationOrchestrator, MigrationPlan};
pub use risk::{
    DependencyDepthRule, DestructiveOperationRule, DurationRule, PlanContext, RiskAssessment,
    RiskFinding, RiskLevel, RiskRule,
};
