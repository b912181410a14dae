//! Backing-store gateway contract.
//!
//! The control plane never talks to the relational store directly. Every
//! script execution and metadata query goes through a [`StoreGateway`].
//!
//! Two implementations ship with the crate:
//! - [`PostgresGateway`] executes against a PostgreSQL pool.
//! - [`MemoryGateway`] is a scripted in-memory store for tests and fault
//!   injection.
//!
//! [`CachedGateway`] decorates either one with read caching and latency
//! telemetry.

mod cached;
mod memory;
mod postgres;

pub use cached::{CachedGateway, LIST_TABLES_LABEL};
pub use memory::MemoryGateway;
pub use postgres::PostgresGateway;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// A table visible in the backing store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    /// Table name.
    pub name: String,
}

impl TableInfo {
    /// Create a table descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Kind of metadata the gateway can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataKind {
    /// Active connection count. One row with a `count` column.
    Connections,
    /// Per-table size. Rows with `table`, `bytes` and `rows` columns.
    TableSizes,
    /// Per-index usage. Rows with `table`, `index` and `scans` columns.
    IndexUsage,
    /// Row-level security coverage. Rows with `table` and `enabled` columns.
    RlsEffectiveness,
}

impl std::fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataKind::Connections => write!(f, "connections"),
            MetadataKind::TableSizes => write!(f, "tableSizes"),
            MetadataKind::IndexUsage => write!(f, "indexUsage"),
            MetadataKind::RlsEffectiveness => write!(f, "rlsEffectiveness"),
        }
    }
}

/// A single structured metadata row, keyed by column name.
pub type MetadataRow = serde_json::Map<String, serde_json::Value>;

/// Read an unsigned integer column from a metadata row.
///
/// Accepts JSON numbers and numeric strings (PostgreSQL reports `bigint`
/// sums as text through `row_to_json`).
pub fn row_u64(row: &MetadataRow, column: &str) -> Option<u64> {
    match row.get(column)? {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Read a string column from a metadata row.
pub fn row_str<'a>(row: &'a MetadataRow, column: &str) -> Option<&'a str> {
    row.get(column).and_then(|v| v.as_str())
}

/// Narrow execution interface to the relational backing store.
///
/// Idempotency is the caller's responsibility; implementations never retry.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Execute an arbitrary script.
    async fn execute_script(&self, sql: &str) -> Result<(), GatewayError>;

    /// List user tables.
    async fn list_tables(&self) -> Result<Vec<TableInfo>, GatewayError>;

    /// Query structured metadata.
    async fn query_metadata(&self, kind: MetadataKind) -> Result<Vec<MetadataRow>, GatewayError>;

    /// Check that the backing store is reachable.
    async fn ping(&self) -> Result<(), GatewayError> {
        self.list_tables().await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> MetadataRow {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_row_u64_accepts_numbers_and_strings() {
        let r = row(json!({"count": 12, "bytes": "4096", "ratio": 2.0, "name": "x"}));
        assert_eq!(row_u64(&r, "count"), Some(12));
        assert_eq!(row_u64(&r, "bytes"), Some(4096));
        assert_eq!(row_u64(&r, "ratio"), Some(2));
        assert_eq!(row_u64(&r, "name"), None);
        assert_eq!(row_u64(&r, "missing"), None);
    }

    #[test]
    fn test_metadata_kind_display() {
        assert_eq!(MetadataKind::TableSizes.to_string(), "tableSizes");
        assert_eq!(
            serde_json::to_string(&MetadataKind::RlsEffectiveness).unwrap(),
            "\"rlsEffectiveness\""
        );
    }
}
