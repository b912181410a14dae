//! PostgreSQL gateway backed by an sqlx pool.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::debug;

use super::{MetadataKind, MetadataRow, StoreGateway, TableInfo};
use crate::error::GatewayError;

/// Default schema inspected for tables and statistics.
pub const DEFAULT_SCHEMA: &str = "public";

const CONNECTIONS_SQL: &str = r#"
SELECT row_to_json(t)::text FROM (
    SELECT count(*)::bigint AS count
    FROM pg_stat_activity
    WHERE datname = current_database()
) t
"#;

const TABLE_SIZES_SQL: &str = r#"
SELECT row_to_json(t)::text FROM (
    SELECT relname AS table,
           pg_total_relation_size(relid)::bigint AS bytes,
           n_live_tup::bigint AS rows
    FROM pg_stat_user_tables
    WHERE schemaname = $1
    ORDER BY bytes DESC
) t
"#;

const INDEX_USAGE_SQL: &str = r#"
SELECT row_to_json(t)::text FROM (
    SELECT relname AS table,
           indexrelname AS index,
           idx_scan::bigint AS scans
    FROM pg_stat_user_indexes
    WHERE schemaname = $1
    ORDER BY scans ASC
) t
"#;

const RLS_SQL: &str = r#"
SELECT row_to_json(t)::text FROM (
    SELECT tablename AS table,
           rowsecurity AS enabled
    FROM pg_tables
    WHERE schemaname = $1
    ORDER BY tablename
) t
"#;

/// [`StoreGateway`] over a PostgreSQL connection pool.
pub struct PostgresGateway {
    pool: PgPool,
    schema: String,
}

impl PostgresGateway {
    /// Connect to `database_url` with a small pool.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }

    /// Inspect a schema other than `public`.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    async fn fetch_rows(&self, sql: &str, bind_schema: bool) -> Result<Vec<MetadataRow>, GatewayError> {
        let mut query = sqlx::query_scalar::<_, String>(sql);
        if bind_schema {
            query = query.bind(&self.schema);
        }

        let encoded = query.fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        encoded
            .iter()
            .map(|text| {
                serde_json::from_str::<MetadataRow>(text)
                    .map_err(|e| GatewayError::Execution(format!("malformed metadata row: {}", e)))
            })
            .collect()
    }
}

fn map_sqlx_error(err: sqlx::Error) -> GatewayError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            GatewayError::Connection(err.to_string())
        }
        other => GatewayError::Execution(other.to_string()),
    }
}

#[async_trait]
impl StoreGateway for PostgresGateway {
    async fn execute_script(&self, sql: &str) -> Result<(), GatewayError> {
        debug!(bytes = sql.len(), "executing script");
        sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, GatewayError> {
        let names = sqlx::query_scalar::<_, String>(
            "SELECT tablename::text FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(names.into_iter().map(TableInfo::new).collect())
    }

    async fn query_metadata(&self, kind: MetadataKind) -> Result<Vec<MetadataRow>, GatewayError> {
        match kind {
            MetadataKind::Connections => self.fetch_rows(CONNECTIONS_SQL, false).await,
            MetadataKind::TableSizes => self.fetch_rows(TABLE_SIZES_SQL, true).await,
            MetadataKind::IndexUsage => self.fetch_rows(INDEX_USAGE_SQL, true).await,
            MetadataKind::RlsEffectiveness => self.fetch_rows(RLS_SQL, true).await,
        }
    }

    async fn ping(&self) -> Result<(), GatewayError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
