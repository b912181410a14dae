//! Control plane configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;
use crate::error::Error;

/// Default deadline for a single migration script (seconds).
pub const DEFAULT_SCRIPT_TIMEOUT_SECS: u64 = 300;

/// Default deadline for a backup transfer (seconds).
pub const DEFAULT_BACKUP_TIMEOUT_SECS: u64 = 1800;

/// Default deadline for a single recovery step (seconds).
pub const DEFAULT_RECOVERY_STEP_TIMEOUT_SECS: u64 = 600;

/// Default maximum number of cache entries.
pub const DEFAULT_CACHE_MAX_SIZE: usize = 1000;

/// Default cache entry time-to-live (seconds).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Aggregate estimated duration above which a plan counts as risky (seconds).
pub const DEFAULT_RISK_DURATION_SECS: u64 = 300;

/// Dependency chain depth above which a plan counts as risky.
pub const DEFAULT_RISK_DEPENDENCY_DEPTH: usize = 3;

/// Window within which at least one backup must have completed (hours).
pub const DEFAULT_BACKUP_STALE_HOURS: i64 = 24;

/// Backup size above which archiving is recommended (1 GiB).
pub const DEFAULT_LARGE_BACKUP_BYTES: u64 = 1024 * 1024 * 1024;

/// Failure ratio above which the backup failure rate is flagged.
pub const DEFAULT_MAX_BACKUP_FAILURE_RATIO: f64 = 0.10;

/// Connection count above which an alert is raised.
pub const DEFAULT_MAX_CONNECTIONS: u64 = 50;

/// Average query time above which an alert is raised (milliseconds).
pub const DEFAULT_MAX_AVG_QUERY_MS: f64 = 1000.0;

/// Average query time above which a query is reported as slow (milliseconds).
pub const DEFAULT_SLOW_QUERY_MS: f64 = 500.0;

/// Per sub-check deadline during a health scan (seconds).
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Interval between monitoring scans (seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Number of trend points retained.
pub const DEFAULT_TREND_CAPACITY: usize = 288;

/// Number of alerts retained before the oldest resolved ones are dropped.
pub const DEFAULT_ALERT_RETENTION: usize = 500;

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub max_size: usize,
    /// Entry time-to-live.
    pub ttl: Duration,
    /// Eviction policy applied at capacity.
    pub policy: EvictionPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CACHE_MAX_SIZE,
            ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            policy: EvictionPolicy::Lru,
        }
    }
}

/// Thresholds used by the migration risk rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Aggregate estimated duration considered risky.
    pub max_duration: Duration,
    /// Dependency depth considered risky when exceeded.
    pub max_dependency_depth: usize,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(DEFAULT_RISK_DURATION_SECS),
            max_dependency_depth: DEFAULT_RISK_DEPENDENCY_DEPTH,
        }
    }
}

/// Thresholds used by the backup health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupHealthThresholds {
    /// A completed backup must exist within this many hours.
    pub stale_after_hours: i64,
    /// Size above which a backup is considered large.
    pub large_backup_bytes: u64,
    /// Failure ratio above which the failure rate is flagged.
    pub max_failure_ratio: f64,
}

impl Default for BackupHealthThresholds {
    fn default() -> Self {
        Self {
            stale_after_hours: DEFAULT_BACKUP_STALE_HOURS,
            large_backup_bytes: DEFAULT_LARGE_BACKUP_BYTES,
            max_failure_ratio: DEFAULT_MAX_BACKUP_FAILURE_RATIO,
        }
    }
}

/// Thresholds and timing for the health aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Connection count above which an alert is raised.
    pub max_connections: u64,
    /// Average query time above which an alert is raised (ms).
    pub max_avg_query_ms: f64,
    /// Average time above which a single query is reported as slow (ms).
    pub slow_query_ms: f64,
    /// Deadline for each sub-check.
    pub check_timeout: Duration,
    /// Interval between monitoring scans.
    pub poll_interval: Duration,
    /// Number of trend points retained.
    pub trend_capacity: usize,
    /// Number of alerts retained; only resolved alerts are dropped.
    pub alert_retention: usize,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_avg_query_ms: DEFAULT_MAX_AVG_QUERY_MS,
            slow_query_ms: DEFAULT_SLOW_QUERY_MS,
            check_timeout: Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            trend_capacity: DEFAULT_TREND_CAPACITY,
            alert_retention: DEFAULT_ALERT_RETENTION,
        }
    }
}

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct OpsConfig {
    /// Directory of the state store. `None` keeps state in a temporary store.
    pub data_path: Option<PathBuf>,
    /// Deadline for a single migration up or down script.
    pub script_timeout: Duration,
    /// Deadline for a backup transfer.
    pub backup_timeout: Duration,
    /// Deadline for a single recovery step.
    pub recovery_step_timeout: Duration,
    /// Cache settings.
    pub cache: CacheConfig,
    /// Migration risk thresholds.
    pub risk: RiskThresholds,
    /// Backup health thresholds.
    pub backup_health: BackupHealthThresholds,
    /// Health aggregator thresholds.
    pub health: HealthThresholds,
}

impl OpsConfig {
    /// Create a configuration persisting state under `data_path`.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: Some(data_path.into()),
            ..Self::ephemeral()
        }
    }

    /// Create a configuration with a temporary state store.
    pub fn ephemeral() -> Self {
        Self {
            data_path: None,
            script_timeout: Duration::from_secs(DEFAULT_SCRIPT_TIMEOUT_SECS),
            backup_timeout: Duration::from_secs(DEFAULT_BACKUP_TIMEOUT_SECS),
            recovery_step_timeout: Duration::from_secs(DEFAULT_RECOVERY_STEP_TIMEOUT_SECS),
            cache: CacheConfig::default(),
            risk: RiskThresholds::default(),
            backup_health: BackupHealthThresholds::default(),
            health: HealthThresholds::default(),
        }
    }

    /// Set the migration script deadline.
    pub fn with_script_timeout(mut self, timeout: Duration) -> Self {
        self.script_timeout = timeout;
        self
    }

    /// Set the backup transfer deadline.
    pub fn with_backup_timeout(mut self, timeout: Duration) -> Self {
        self.backup_timeout = timeout;
        self
    }

    /// Set the recovery step deadline.
    pub fn with_recovery_step_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_step_timeout = timeout;
        self
    }

    /// Set the cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Set the migration risk thresholds.
    pub fn with_risk(mut self, risk: RiskThresholds) -> Self {
        self.risk = risk;
        self
    }

    /// Set the backup health thresholds.
    pub fn with_backup_health(mut self, thresholds: BackupHealthThresholds) -> Self {
        self.backup_health = thresholds;
        self
    }

    /// Set the health aggregator thresholds.
    pub fn with_health(mut self, health: HealthThresholds) -> Self {
        self.health = health;
        self
    }

    /// Set the monitoring poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.health.poll_interval = interval;
        self
    }

    /// Check if state survives a restart.
    pub fn is_persistent(&self) -> bool {
        self.data_path.is_some()
    }

    /// Reject settings the control plane cannot run with.
    pub fn validate(&self) -> Result<(), Error> {
        validate_poll_interval(self.health.poll_interval)
    }
}

/// A monitoring interval must be non-zero.
pub fn validate_poll_interval(interval: Duration) -> Result<(), Error> {
    if interval.is_zero() {
        return Err(Error::Validation(
            "poll interval must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self::new("./opsdeck-data")
    }
}
