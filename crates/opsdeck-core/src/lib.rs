//! Opsdeck Core - data-tier operations control plane.
//!
//! This crate manages schema migrations, backups and recovery, an adaptive
//! query cache with latency telemetry, and an aggregated health view of the
//! backing relational store. All work against the store goes through a
//! [`StoreGateway`]; all control plane state is persisted in a sled-backed
//! [`StateStore`].

pub mod backup;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod gateway;
pub mod health;
pub mod ids;
pub mod migration;
pub mod store;
pub mod task;

pub use backup::{
    Backup, BackupHealth, BackupManager, BackupStatus, BackupTransfer, HealthStatus, RecoveryPlan,
    RecoveryResult, RecoveryStep, RecoveryTemplate, SnapshotTransfer,
};
pub use cache::{
    CacheStats, EvictionPolicy, ExplainInfo, OptimizationRule, PerformanceSnapshot, QueryAdvisor,
    QueryCache, QueryMetric, QueryTelemetry, Suggestion,
};
pub use config::{
    BackupHealthThresholds, CacheConfig, HealthThresholds, OpsConfig, RiskThresholds,
};
pub use context::ControlPlane;
pub use error::{Error, GatewayError, Result};
pub use gateway::{
    CachedGateway, MemoryGateway, MetadataKind, MetadataRow, PostgresGateway, StoreGateway,
    TableInfo,
};
pub use health::{
    Alert, AlertLog, AlertSeverity, HealthAggregator, HealthReport, Monitor, TrendHistory,
    TrendPoint,
};
pub use migration::{
    ExecutionReport, Migration, MigrationEvent, MigrationOrchestrator, MigrationPlan,
    MigrationStatus, MigrationSummary, RiskAssessment, RiskLevel, RiskRule,
};
pub use store::StateStore;
pub use task::{dispatch, CancellationToken};
