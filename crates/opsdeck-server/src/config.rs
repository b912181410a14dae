//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use opsdeck_core::{CacheConfig, EvictionPolicy, OpsConfig};

/// Opsdeck server command line arguments.
#[derive(Debug, Parser)]
#[command(name = "opsdeck-server")]
#[command(about = "HTTP/JSON API for the Opsdeck data-tier control plane")]
pub struct Args {
    /// Address to listen on for HTTP requests.
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// PostgreSQL connection URL of the backing store.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Maximum number of pooled backing-store connections.
    #[arg(long, default_value_t = 5)]
    pub pool_max_connections: u32,

    /// Timeout (ms) when acquiring a pooled connection.
    #[arg(long, default_value_t = 10_000)]
    pub pool_acquire_timeout_ms: u64,

    /// Directory of the control plane state store.
    #[arg(short, long, default_value = "./opsdeck-data")]
    pub data_dir: PathBuf,

    /// Keep control plane state in a temporary store.
    #[arg(long)]
    pub ephemeral: bool,

    /// Deadline (s) for a single migration script.
    #[arg(long, default_value_t = opsdeck_core::config::DEFAULT_SCRIPT_TIMEOUT_SECS)]
    pub script_timeout_secs: u64,

    /// Deadline (s) for a backup transfer.
    #[arg(long, default_value_t = opsdeck_core::config::DEFAULT_BACKUP_TIMEOUT_SECS)]
    pub backup_timeout_secs: u64,

    /// Deadline (s) for a single recovery step.
    #[arg(long, default_value_t = opsdeck_core::config::DEFAULT_RECOVERY_STEP_TIMEOUT_SECS)]
    pub recovery_step_timeout_secs: u64,

    /// Maximum number of cache entries.
    #[arg(long, default_value_t = opsdeck_core::config::DEFAULT_CACHE_MAX_SIZE)]
    pub cache_max_size: usize,

    /// Cache entry time-to-live (s).
    #[arg(long, default_value_t = opsdeck_core::config::DEFAULT_CACHE_TTL_SECS)]
    pub cache_ttl_secs: u64,

    /// Cache eviction policy (lru, fifo, ttl-oldest).
    #[arg(long, default_value = "lru")]
    pub cache_policy: EvictionPolicy,

    /// Interval (s) between monitoring scans.
    #[arg(
        long,
        default_value_t = opsdeck_core::config::DEFAULT_POLL_INTERVAL_SECS,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub poll_interval_secs: u64,

    /// Start periodic health monitoring at boot.
    #[arg(long)]
    pub monitor: bool,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on for HTTP requests.
    pub listen_addr: String,
    /// Backing store connection URL.
    pub database_url: String,
    /// Maximum number of pooled backing-store connections.
    pub pool_max_connections: u32,
    /// Timeout when acquiring a pooled connection.
    pub pool_acquire_timeout: Duration,
    /// Start monitoring at boot.
    pub monitor_on_start: bool,
    /// Control plane configuration.
    pub ops: OpsConfig,
}

impl From<&Args> for ServerConfig {
    fn from(args: &Args) -> Self {
        let ops = if args.ephemeral {
            OpsConfig::ephemeral()
        } else {
            OpsConfig::new(args.data_dir.clone())
        };
        let ops = ops
            .with_script_timeout(Duration::from_secs(args.script_timeout_secs))
            .with_backup_timeout(Duration::from_secs(args.backup_timeout_secs))
            .with_recovery_step_timeout(Duration::from_secs(args.recovery_step_timeout_secs))
            .with_cache(CacheConfig {
                max_size: args.cache_max_size,
                ttl: Duration::from_secs(args.cache_ttl_secs),
                policy: args.cache_policy,
            })
            .with_poll_interval(Duration::from_secs(args.poll_interval_secs));

        Self {
            listen_addr: args.listen.clone(),
            database_url: args.database_url.clone(),
            pool_max_connections: args.pool_max_connections,
            pool_acquire_timeout: Duration::from_millis(args.pool_acquire_timeout_ms),
            monitor_on_start: args.monitor,
            ops,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            database_url: "postgres://localhost/opsdeck".to_string(),
            pool_max_connections: 5,
            pool_acquire_timeout: Duration::from_secs(10),
            monitor_on_start: false,
            ops: OpsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "opsdeck-server",
            "--database-url",
            "postgres://db/app",
            "--ephemeral",
            "--cache-policy",
            "fifo",
            "--poll-interval-secs",
            "15",
            "--monitor",
        ]);
        let config = ServerConfig::from(&args);

        assert_eq!(config.database_url, "postgres://db/app");
        assert!(config.monitor_on_start);
        assert!(!config.ops.is_persistent());
        assert_eq!(config.ops.cache.policy, EvictionPolicy::Fifo);
        assert_eq!(config.ops.health.poll_interval, Duration::from_secs(15));
    }

    #[test]
    fn test_zero_poll_interval_rejected_at_parse() {
        let result = Args::try_parse_from([
            "opsdeck-server",
            "--database-url",
            "postgres://db/app",
            "--poll-interval-secs",
            "0",
        ]);
        assert!(result.is_err());
    }
}
