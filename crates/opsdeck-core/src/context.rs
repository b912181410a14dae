//! The control plane context.
//!
//! Constructed once at startup and shared by reference. Owns the state
//! store and every component, and starts or stops the health monitor.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::backup::BackupManager;
use crate::cache::{QueryAdvisor, QueryCache, QueryTelemetry};
use crate::config::{validate_poll_interval, OpsConfig};
use crate::error::Error;
use crate::gateway::{CachedGateway, StoreGateway};
use crate::health::{AlertLog, HealthAggregator, HealthSources, Monitor, TrendHistory};
use crate::migration::MigrationOrchestrator;
use crate::store::StateStore;

/// All control plane components.
pub struct ControlPlane {
    config: OpsConfig,
    store: StateStore,
    gateway: Arc<dyn StoreGateway>,
    migrations: Arc<MigrationOrchestrator>,
    backups: Arc<BackupManager>,
    cache: Arc<QueryCache>,
    telemetry: Arc<QueryTelemetry>,
    advisor: QueryAdvisor,
    health: Arc<HealthAggregator>,
    monitor: Mutex<Option<Monitor>>,
}

impl ControlPlane {
    /// Open the state store and load every component.
    pub fn open(config: OpsConfig, gateway: Arc<dyn StoreGateway>) -> Result<Self, Error> {
        config.validate()?;
        let store = match &config.data_path {
            Some(path) => StateStore::open(path)?,
            None => StateStore::temporary()?,
        };

        let cache = Arc::new(QueryCache::new(&config.cache));
        let telemetry = Arc::new(QueryTelemetry::new());
        let gateway: Arc<dyn StoreGateway> = Arc::new(CachedGateway::new(
            gateway,
            Arc::clone(&cache),
            Arc::clone(&telemetry),
        ));

        let migrations = Arc::new(MigrationOrchestrator::open(
            &store,
            Arc::clone(&gateway),
            &config,
        )?);
        let backups = Arc::new(BackupManager::open(&store, Arc::clone(&gateway), &config)?);

        let health = Arc::new(HealthAggregator::new(
            HealthSources {
                migrations: Arc::clone(&migrations),
                backups: Arc::clone(&backups),
                cache: Arc::clone(&cache),
                telemetry: Arc::clone(&telemetry),
                gateway: Arc::clone(&gateway),
            },
            Arc::new(AlertLog::open(&store, config.health.alert_retention)?),
            Arc::new(TrendHistory::open(&store, config.health.trend_capacity)?),
            config.health.clone(),
        ));

        info!(
            persistent = config.is_persistent(),
            cache_policy = %config.cache.policy,
            "control plane opened"
        );

        Ok(Self {
            config,
            store,
            gateway,
            migrations,
            backups,
            cache,
            telemetry,
            advisor: QueryAdvisor::new(),
            health,
            monitor: Mutex::new(None),
        })
    }

    /// Active configuration.
    pub fn config(&self) -> &OpsConfig {
        &self.config
    }

    /// Backing store gateway, wrapped with read caching and telemetry.
    pub fn gateway(&self) -> &Arc<dyn StoreGateway> {
        &self.gateway
    }

    /// Migration orchestrator.
    pub fn migrations(&self) -> &MigrationOrchestrator {
        &self.migrations
    }

    /// Backup manager.
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Query cache.
    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Query telemetry.
    pub fn telemetry(&self) -> &QueryTelemetry {
        &self.telemetry
    }

    /// Query advisor.
    pub fn advisor(&self) -> &QueryAdvisor {
        &self.advisor
    }

    /// Health aggregator.
    pub fn health(&self) -> &HealthAggregator {
        &self.health
    }

    /// Start periodic health scans.
    ///
    /// Uses the configured poll interval unless `interval` is given. A zero
    /// interval is a validation error. Returns `false` if monitoring is
    /// already running. Must be called from within a tokio runtime.
    pub fn start_monitoring(&self, interval: Option<Duration>) -> Result<bool, Error> {
        let interval = interval.unwrap_or(self.config.health.poll_interval);
        validate_poll_interval(interval)?;

        let mut monitor = self.monitor.lock();
        if monitor.as_ref().is_some_and(|m| !m.is_finished()) {
            return Ok(false);
        }
        *monitor = Some(Monitor::start(Arc::clone(&self.health), interval));
        Ok(true)
    }

    /// Stop periodic health scans and wait for the task to exit.
    ///
    /// Returns `false` if monitoring was not running.
    pub async fn stop_monitoring(&self) -> bool {
        let monitor = self.monitor.lock().take();
        match monitor {
            Some(monitor) => {
                monitor.join().await;
                true
            }
            None => false,
        }
    }

    /// Check if periodic health scans are running.
    pub fn is_monitoring(&self) -> bool {
        self.monitor
            .lock()
            .as_ref()
            .is_some_and(|m| !m.is_finished())
    }

    /// Flush the state store.
    pub fn flush(&self) -> Result<(), Error> {
        self.store.flush()
    }

    /// Stop monitoring and flush state.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.stop_monitoring().await;
        self.flush()?;
        info!("control plane shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use crate::task::CancellationToken;

    fn plane() -> ControlPlane {
        ControlPlane::open(OpsConfig::ephemeral(), Arc::new(MemoryGateway::new())).unwrap()
    }

    #[tokio::test]
    async fn test_components_share_state() {
        let plane = plane();
        let m = plane
            .migrations()
            .define("projects", "", "CREATE TABLE projects ();", "", vec![])
            .unwrap();
        plane
            .migrations()
            .execute(&m.id, &CancellationToken::new())
            .await
            .unwrap();

        let report = plane.health().report().await;
        assert_eq!(report.migrations.completed, 1);
    }

    #[tokio::test]
    async fn test_monitoring_start_stop() {
        let plane = plane();
        assert!(!plane.is_monitoring());

        assert!(plane.start_monitoring(Some(Duration::from_secs(3600))).unwrap());
        assert!(!plane.start_monitoring(None).unwrap());
        assert!(plane.is_monitoring());

        assert!(plane.stop_monitoring().await);
        assert!(!plane.stop_monitoring().await);
        assert!(!plane.is_monitoring());

        plane.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let plane = plane();
        let err = plane.start_monitoring(Some(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!plane.is_monitoring());

        let config = OpsConfig::ephemeral().with_poll_interval(Duration::ZERO);
        let result = ControlPlane::open(config, Arc::new(MemoryGateway::new()));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_persistent_plane_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let config = OpsConfig::new(dir.path());
        let gateway: Arc<dyn StoreGateway> = Arc::new(MemoryGateway::new());

        let id = {
            let plane = ControlPlane::open(config.clone(), Arc::clone(&gateway)).unwrap();
            let m = plane
                .migrations()
                .define("projects", "", "CREATE TABLE projects ();", "", vec![])
                .unwrap();
            plane.shutdown().await.unwrap();
            m.id
        };

        let plane = ControlPlane::open(config, gateway).unwrap();
        assert!(plane.migrations().get(&id).is_some());
    }
}
