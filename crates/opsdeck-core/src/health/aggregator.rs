//! Operations health aggregator.
//!
//! Reads from every component concurrently, applies threshold rules and
//! produces a [`HealthReport`]. It never mutates the managers it reads;
//! only [`scan`](HealthAggregator::scan) writes, and only to the alert log
//! and trend history.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use super::alerts::{AlertLog, AlertSeverity};
use super::report::{
    overall_status, AlertCandidate, DatabaseReport, HealthReport, PerformanceReport,
};
use super::trends::{TrendHistory, TrendPoint};
use crate::backup::{BackupHealth, BackupManager, HealthStatus};
use crate::cache::{QueryCache, QueryTelemetry};
use crate::config::HealthThresholds;
use crate::error::GatewayError;
use crate::gateway::{row_u64, MetadataKind, StoreGateway};
use crate::migration::{MigrationOrchestrator, MigrationSummary};

/// Components the aggregator reads from.
#[derive(Clone)]
pub struct HealthSources {
    /// Migration orchestrator.
    pub migrations: Arc<MigrationOrchestrator>,
    /// Backup manager.
    pub backups: Arc<BackupManager>,
    /// Query cache.
    pub cache: Arc<QueryCache>,
    /// Query telemetry.
    pub telemetry: Arc<QueryTelemetry>,
    /// Backing store gateway.
    pub gateway: Arc<dyn StoreGateway>,
}

/// Builds health reports and records alerts and trends.
pub struct HealthAggregator {
    sources: HealthSources,
    alerts: Arc<AlertLog>,
    trends: Arc<TrendHistory>,
    thresholds: HealthThresholds,
}

impl HealthAggregator {
    /// Create an aggregator.
    pub fn new(
        sources: HealthSources,
        alerts: Arc<AlertLog>,
        trends: Arc<TrendHistory>,
        thresholds: HealthThresholds,
    ) -> Self {
        Self {
            sources,
            alerts,
            trends,
            thresholds,
        }
    }

    /// The alert log written by scans.
    pub fn alerts(&self) -> &AlertLog {
        &self.alerts
    }

    /// The trend history written by scans.
    pub fn trends(&self) -> &TrendHistory {
        &self.trends
    }

    /// Build a report without recording anything.
    pub async fn report(&self) -> HealthReport {
        self.build().await.0
    }

    /// Build a report, raise its alerts and record a trend point.
    ///
    /// Failures to persist are logged and do not fail the scan.
    pub async fn scan(&self) -> HealthReport {
        let (report, candidates) = self.build().await;

        for candidate in &candidates {
            if let Err(e) = self.alerts.raise(&candidate.message, candidate.severity) {
                warn!(error = %e, "failed to record alert");
            }
        }
        if let Err(e) = self.trends.push(TrendPoint::from(&report)) {
            warn!(error = %e, "failed to record trend point");
        }

        info!(
            status = %report.status,
            alerts = report.alerts.len(),
            degraded = report.degraded.len(),
            "health scan completed"
        );
        report
    }

    async fn build(&self) -> (HealthReport, Vec<AlertCandidate>) {
        let timeout = self.thresholds.check_timeout;

        let (migrations, backups, performance, connections, tables) = tokio::join!(
            within("migrations", timeout, async {
                Ok::<_, GatewayError>(self.sources.migrations.status())
            }),
            within("backups", timeout, async {
                Ok::<_, GatewayError>(self.sources.backups.check_backup_health())
            }),
            within("performance", timeout, async {
                Ok::<_, GatewayError>(self.performance())
            }),
            within("connections", timeout, self.connections()),
            within("tableSizes", timeout, self.table_sizes()),
        );

        let mut degraded = Vec::new();
        let migrations = migrations.unwrap_or_else(|e| {
            degraded.push(e);
            MigrationSummary::default()
        });
        let backups = backups.unwrap_or_else(|e| {
            degraded.push(e);
            BackupHealth {
                status: HealthStatus::Warning,
                issues: vec!["Backup health unavailable".to_string()],
                recommendations: vec![],
            }
        });
        let performance = performance.unwrap_or_else(|e| {
            degraded.push(e);
            PerformanceReport::default()
        });

        let mut database = DatabaseReport::default();
        match connections {
            Ok(count) => database.connections = Some(count),
            Err(e) => degraded.push(e),
        }
        match tables {
            Ok((count, bytes)) => {
                database.table_count = Some(count);
                database.total_bytes = Some(bytes);
            }
            Err(e) => degraded.push(e),
        }

        let slow_queries = self
            .sources
            .telemetry
            .slow_queries(self.thresholds.slow_query_ms)
            .len();
        let candidates = dedup(self.evaluate(
            &migrations,
            &backups,
            &performance,
            &database,
            slow_queries,
        ));

        for failure in &degraded {
            warn!(check = %failure, "health sub-check degraded");
        }

        let report = HealthReport {
            generated_at: Utc::now(),
            status: overall_status(&candidates, &degraded),
            migrations,
            backups,
            performance,
            database,
            alerts: candidates.iter().map(|c| c.message.clone()).collect(),
            degraded,
        };
        (report, candidates)
    }

    fn performance(&self) -> PerformanceReport {
        let snapshot = self.sources.telemetry.snapshot();
        PerformanceReport {
            query_time: snapshot.query_time,
            cache_hit_rate: self.sources.cache.stats().hit_rate,
            throughput: snapshot.throughput,
        }
    }

    async fn connections(&self) -> Result<u64, GatewayError> {
        let rows = self
            .sources
            .gateway
            .query_metadata(MetadataKind::Connections)
            .await?;
        Ok(rows.first().and_then(|r| row_u64(r, "count")).unwrap_or(0))
    }

    async fn table_sizes(&self) -> Result<(usize, u64), GatewayError> {
        let rows = self
            .sources
            .gateway
            .query_metadata(MetadataKind::TableSizes)
            .await?;
        let bytes = rows.iter().filter_map(|r| row_u64(r, "bytes")).sum();
        Ok((rows.len(), bytes))
    }

    fn evaluate(
        &self,
        migrations: &MigrationSummary,
        backups: &BackupHealth,
        performance: &PerformanceReport,
        database: &DatabaseReport,
        slow_queries: usize,
    ) -> Vec<AlertCandidate> {
        let t = &self.thresholds;
        let mut alerts = Vec::new();

        if let Some(connections) = database.connections.filter(|c| *c > t.max_connections) {
            alerts.push(AlertCandidate {
                message: format!(
                    "High connection count: {} active (limit {})",
                    connections, t.max_connections
                ),
                severity: AlertSeverity::Warning,
            });
        }

        if performance.query_time > t.max_avg_query_ms {
            alerts.push(AlertCandidate {
                message: format!(
                    "Average query time {:.0}ms exceeds {:.0}ms",
                    performance.query_time, t.max_avg_query_ms
                ),
                severity: AlertSeverity::Warning,
            });
        }

        if backups.status == HealthStatus::Critical {
            alerts.push(AlertCandidate {
                message: format!("Backup health critical: {}", backups.issues.join("; ")),
                severity: AlertSeverity::Critical,
            });
        }

        if migrations.failed > 0 {
            alerts.push(AlertCandidate {
                message: format!("{} failed migration(s) need attention", migrations.failed),
                severity: AlertSeverity::Critical,
            });
        }

        if slow_queries > 0 {
            alerts.push(AlertCandidate {
                message: format!(
                    "{} slow queries averaging above {:.0}ms",
                    slow_queries, t.slow_query_ms
                ),
                severity: AlertSeverity::Warning,
            });
        }

        alerts
    }
}

/// Run a sub-check under its own deadline, describing any failure.
async fn within<T, E, F>(name: &str, timeout: Duration, check: F) -> Result<T, String>
where
    E: Display,
    F: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(timeout, check).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{}: {}", name, e)),
        Err(_) => Err(format!("{}: timed out after {:?}", name, timeout)),
    }
}

fn dedup(candidates: Vec<AlertCandidate>) -> Vec<AlertCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.message.clone()))
        .collect()
}
