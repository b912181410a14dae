//! In-memory gateway.
//!
//! Records every executed script and answers metadata queries from tables
//! configured up front. Failures and latency are injected explicitly, which
//! keeps fault injection out of production code paths.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;

use super::{MetadataKind, MetadataRow, StoreGateway, TableInfo};
use crate::error::GatewayError;

#[derive(Default)]
struct MemoryState {
    tables: Vec<TableInfo>,
    table_bytes: HashMap<String, u64>,
    metadata: HashMap<MetadataKind, Vec<MetadataRow>>,
    executed: Vec<String>,
    failing_patterns: Vec<String>,
    failing_metadata: Vec<MetadataKind>,
    unreachable: bool,
}

/// Scripted in-memory [`StoreGateway`].
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<MemoryState>,
    latency: Mutex<Option<Duration>>,
}

impl MemoryGateway {
    /// Create an empty gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with the given size in bytes.
    pub fn with_table(self, name: &str, bytes: u64) -> Self {
        {
            let mut state = self.state.lock();
            state.tables.push(TableInfo::new(name));
            state.table_bytes.insert(name.to_string(), bytes);
        }
        self
    }

    /// Report a fixed active connection count.
    pub fn with_connections(self, count: u64) -> Self {
        self.set_metadata(MetadataKind::Connections, vec![object(json!({ "count": count }))]);
        self
    }

    /// Replace the rows returned for a metadata kind.
    pub fn set_metadata(&self, kind: MetadataKind, rows: Vec<MetadataRow>) {
        self.state.lock().metadata.insert(kind, rows);
    }

    /// Make every script containing `pattern` fail.
    pub fn fail_scripts_containing(&self, pattern: impl Into<String>) {
        self.state.lock().failing_patterns.push(pattern.into());
    }

    /// Make metadata queries of `kind` fail.
    pub fn fail_metadata(&self, kind: MetadataKind) {
        self.state.lock().failing_metadata.push(kind);
    }

    /// Clear all injected failures.
    pub fn heal(&self) {
        let mut state = self.state.lock();
        state.failing_patterns.clear();
        state.failing_metadata.clear();
        state.unreachable = false;
    }

    /// Make every call fail with a connection error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Scripts executed successfully, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_reachable(state: &MemoryState) -> Result<(), GatewayError> {
        if state.unreachable {
            return Err(GatewayError::Connection("backing store unreachable".to_string()));
        }
        Ok(())
    }
}

fn object(value: serde_json::Value) -> MetadataRow {
    match value {
        serde_json::Value::Object(map) => map,
        _ => MetadataRow::new(),
    }
}

#[async_trait]
impl StoreGateway for MemoryGateway {
    async fn execute_script(&self, sql: &str) -> Result<(), GatewayError> {
        self.simulate_latency().await;

        let mut state = self.state.lock();
        Self::check_reachable(&state)?;

        if let Some(pattern) = state.failing_patterns.iter().find(|p| sql.contains(p.as_str())) {
            return Err(GatewayError::Execution(format!(
                "script rejected (matched '{}')",
                pattern
            )));
        }

        state.executed.push(sql.to_string());
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<TableInfo>, GatewayError> {
        self.simulate_latency().await;

        let state = self.state.lock();
        Self::check_reachable(&state)?;
        Ok(state.tables.clone())
    }

    async fn query_metadata(&self, kind: MetadataKind) -> Result<Vec<MetadataRow>, GatewayError> {
        self.simulate_latency().await;

        let state = self.state.lock();
        Self::check_reachable(&state)?;

        if state.failing_metadata.contains(&kind) {
            return Err(GatewayError::Execution(format!("{} query failed", kind)));
        }

        if let Some(rows) = state.metadata.get(&kind) {
            return Ok(rows.clone());
        }

        let rows = match kind {
            MetadataKind::Connections => vec![object(json!({ "count": 0 }))],
            MetadataKind::TableSizes => state
                .tables
                .iter()
                .map(|t| {
                    let bytes = state.table_bytes.get(&t.name).copied().unwrap_or(0);
                    object(json!({ "table": t.name, "bytes": bytes, "rows": 0 }))
                })
                .collect(),
            MetadataKind::IndexUsage | MetadataKind::RlsEffectiveness => Vec::new(),
        };
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::row_u64;

    #[tokio::test]
    async fn test_records_executed_scripts() {
        let gateway = MemoryGateway::new();
        gateway.execute_script("CREATE TABLE a (id int)").await.unwrap();
        gateway.execute_script("CREATE TABLE b (id int)").await.unwrap();
        assert_eq!(gateway.executed().len(), 2);
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let gateway = MemoryGateway::new();
        gateway.fail_scripts_containing("DROP");
        let err = gateway.execute_script("DROP TABLE a").await.unwrap_err();
        assert!(matches!(err, GatewayError::Execution(_)));
        assert!(gateway.executed().is_empty());

        gateway.heal();
        gateway.execute_script("DROP TABLE a").await.unwrap();
    }

    #[tokio::test]
    async fn test_table_sizes_from_tables() {
        let gateway = MemoryGateway::new()
            .with_table("projects", 2048)
            .with_table("ideas", 1024);
        let rows = gateway.query_metadata(MetadataKind::TableSizes).await.unwrap();
        let total: u64 = rows.iter().filter_map(|r| row_u64(r, "bytes")).sum();
        assert_eq!(total, 3072);
    }

    #[tokio::test]
    async fn test_unreachable() {
        let gateway = MemoryGateway::new().with_connections(3);
        gateway.set_unreachable(true);
        assert!(matches!(
            gateway.ping().await,
            Err(GatewayError::Connection(_))
        ));
    }
}
