//! Caching and timing gateway decorator.
//!
//! Wraps the backing-store gateway the control plane is opened with. Table
//! listings and slow-moving metadata are served from the shared
//! [`QueryCache`]; every call that reaches the backing store is timed into
//! [`QueryTelemetry`].

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use super::{MetadataKind, MetadataRow, StoreGateway, TableInfo};
use crate::cache::{QueryCache, QueryTelemetry};
use crate::error::GatewayError;

const TABLES_KEY: &str = "gateway:tables";
const METADATA_KEY_PREFIX: &str = "gateway:metadata:";

/// Telemetry label for table listings.
pub const LIST_TABLES_LABEL: &str = "gateway:list_tables";

fn metadata_key(kind: MetadataKind) -> String {
    format!("{}{}", METADATA_KEY_PREFIX, kind)
}

/// [`StoreGateway`] decorator that caches reads and records latency.
///
/// Active connection counts are never cached. Executing a script drops every
/// cached read, since it may change the schema. Failures are passed through
/// and never cached.
pub struct CachedGateway {
    inner: Arc<dyn StoreGateway>,
    cache: Arc<QueryCache>,
    telemetry: Arc<QueryTelemetry>,
}

impl CachedGateway {
    /// Wrap `inner`.
    pub fn new(
        inner: Arc<dyn StoreGateway>,
        cache: Arc<QueryCache>,
        telemetry: Arc<QueryTelemetry>,
    ) -> Self {
        Self {
            inner,
            cache,
            telemetry,
        }
    }

    fn invalidate(&self) {
        self.cache.remove(TABLES_KEY);
        for kind in [
            MetadataKind::TableSizes,
            MetadataKind::IndexUsage,
            MetadataKind::RlsEffectiveness,
        ] {
            self.cache.remove(&metadata_key(kind));
        }
    }

    fn record(&self, label: &str, started: Instant) {
        self.telemetry
            .record(label, started.elapsed().as_secs_f64() * 1000.0);
    }
}

#[async_trait]
impl StoreGateway for CachedGateway {
    async fn execute_script(&self, sql: &str) -> Result<(), GatewayError> {
        let started = Instant::now();
        let result = self.inner.execute_script(sql).await;
        self.record(sql, started);
        self.invalidate();
        result
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, GatewayError> {
        if let Some(tables) = self
            .cache
            .get(TABLES_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
        {
            return Ok(tables);
        }

        let started = Instant::now();
        let result = self.inner.list_tables().await;
        self.record(LIST_TABLES_LABEL, started);

        let tables = result?;
        match serde_json::to_value(&tables) {
            Ok(value) => self.cache.set(TABLES_KEY, value),
            Err(e) => debug!(error = %e, "table listing not cached"),
        }
        Ok(tables)
    }

    async fn query_metadata(&self, kind: MetadataKind) -> Result<Vec<MetadataRow>, GatewayError> {
        let key = metadata_key(kind);
        let cacheable = kind != MetadataKind::Connections;

        if cacheable {
            if let Some(rows) = self
                .cache
                .get(&key)
                .and_then(|v| serde_json::from_value(v).ok())
            {
                return Ok(rows);
            }
        }

        let started = Instant::now();
        let result = self.inner.query_metadata(kind).await;
        self.record(&key, started);

        let rows = result?;
        if cacheable {
            let value = serde_json::Value::Array(
                rows.iter().cloned().map(serde_json::Value::Object).collect(),
            );
            self.cache.set(key, value);
        }
        Ok(rows)
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        self.inner.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::gateway::MemoryGateway;

    struct Fixture {
        inner: Arc<MemoryGateway>,
        cache: Arc<QueryCache>,
        telemetry: Arc<QueryTelemetry>,
        gateway: CachedGateway,
    }

    fn fixture() -> Fixture {
        let inner = Arc::new(
            MemoryGateway::new()
                .with_table("projects", 2048)
                .with_connections(3),
        );
        let cache = Arc::new(QueryCache::new(&CacheConfig::default()));
        let telemetry = Arc::new(QueryTelemetry::new());
        let gateway = CachedGateway::new(inner.clone(), cache.clone(), telemetry.clone());
        Fixture {
            inner,
            cache,
            telemetry,
            gateway,
        }
    }

    #[tokio::test]
    async fn test_table_sizes_served_from_cache() {
        let f = fixture();
        let first = f.gateway.query_metadata(MetadataKind::TableSizes).await.unwrap();

        f.inner.set_unreachable(true);
        let second = f.gateway.query_metadata(MetadataKind::TableSizes).await.unwrap();
        assert_eq!(first, second);

        let stats = f.cache.stats();
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.size, 1);

        let metric = f.telemetry.get("gateway:metadata:tableSizes").unwrap();
        assert_eq!(metric.count, 1);
    }

    #[tokio::test]
    async fn test_connections_always_reach_store() {
        let f = fixture();
        f.gateway.query_metadata(MetadataKind::Connections).await.unwrap();
        f.gateway.query_metadata(MetadataKind::Connections).await.unwrap();

        assert!(f.cache.is_empty());
        assert_eq!(
            f.telemetry.get("gateway:metadata:connections").unwrap().count,
            2
        );
    }

    #[tokio::test]
    async fn test_script_invalidates_and_is_timed() {
        let f = fixture();
        f.gateway.list_tables().await.unwrap();
        f.gateway.query_metadata(MetadataKind::TableSizes).await.unwrap();
        assert_eq!(f.cache.len(), 2);

        f.gateway
            .execute_script("CREATE TABLE ideas (id int);")
            .await
            .unwrap();
        assert!(f.cache.is_empty());
        assert_eq!(f.inner.executed().len(), 1);
        assert_eq!(
            f.telemetry.get("CREATE TABLE ideas (id int);").unwrap().count,
            1
        );
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let f = fixture();
        f.inner.fail_metadata(MetadataKind::IndexUsage);
        assert!(f.gateway.query_metadata(MetadataKind::IndexUsage).await.is_err());
        assert!(f.cache.is_empty());

        f.inner.heal();
        assert!(f.gateway.query_metadata(MetadataKind::IndexUsage).await.is_ok());
        assert_eq!(f.telemetry.get("gateway:metadata:indexUsage").unwrap().count, 2);
    }

    #[tokio::test]
    async fn test_ping_bypasses_cache() {
        let f = fixture();
        f.gateway.list_tables().await.unwrap();
        f.inner.set_unreachable(true);

        assert!(f.gateway.list_tables().await.is_ok());
        assert!(f.gateway.ping().await.is_err());
    }
}
