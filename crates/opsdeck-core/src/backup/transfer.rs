//! Backup transfer strategies.

use std::sync::Arc;

use async_trait::async_trait;

use super::model::Backup;
use super::recovery::BACKUP_ID_PLACEHOLDER;
use crate::error::GatewayError;
use crate::gateway::{row_str, row_u64, MetadataKind, StoreGateway};

/// Placeholder replaced by the quoted, comma-separated manifest tables.
pub const TABLES_PLACEHOLDER: &str = "{tables}";

/// Default snapshot command.
///
/// Calls a stored procedure provisioned alongside the backing store, the
/// same convention the default recovery template follows.
pub const DEFAULT_SNAPSHOT_COMMAND: &str =
    "SELECT ops_create_backup('{backup_id}', ARRAY[{tables}]::text[]);";

/// Moves the data captured by a backup into backup storage.
///
/// Returns the size of the transferred artifact in bytes.
#[async_trait]
pub trait BackupTransfer: Send + Sync {
    /// Perform the transfer for `backup`.
    async fn transfer(&self, backup: &Backup) -> Result<u64, GatewayError>;
}

/// Asks the backing store to snapshot the manifest tables, then sizes the
/// artifact from the gateway's `tableSizes` metadata.
///
/// A failed snapshot command fails the transfer before anything is sized.
pub struct SnapshotTransfer {
    gateway: Arc<dyn StoreGateway>,
    command: String,
}

impl SnapshotTransfer {
    /// Create a transfer bound to a gateway with the default command.
    pub fn new(gateway: Arc<dyn StoreGateway>) -> Self {
        Self {
            gateway,
            command: DEFAULT_SNAPSHOT_COMMAND.to_string(),
        }
    }

    /// Replace the snapshot command template.
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }

    /// Render the snapshot command for a backup.
    pub fn render(&self, backup: &Backup) -> String {
        let tables = backup
            .tables
            .iter()
            .map(|t| format!("'{}'", t.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");
        self.command
            .replace(BACKUP_ID_PLACEHOLDER, &backup.id)
            .replace(TABLES_PLACEHOLDER, &tables)
    }
}

#[async_trait]
impl BackupTransfer for SnapshotTransfer {
    async fn transfer(&self, backup: &Backup) -> Result<u64, GatewayError> {
        self.gateway.execute_script(&self.render(backup)).await?;

        let rows = self.gateway.query_metadata(MetadataKind::TableSizes).await?;
        let size = rows
            .iter()
            .filter(|row| {
                row_str(row, "table")
                    .map(|table| backup.tables.iter().any(|t| t == table))
                    .unwrap_or(false)
            })
            .filter_map(|row| row_u64(row, "bytes"))
            .sum();
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn backup(tables: &[&str]) -> Backup {
        Backup::new("bak_1", "", tables.iter().map(|t| t.to_string()).collect())
    }

    #[tokio::test]
    async fn test_sizes_manifest_tables_only() {
        let gateway = Arc::new(
            MemoryGateway::new()
                .with_table("projects", 1000)
                .with_table("ideas", 250)
                .with_table("audit_log", 9000),
        );
        let transfer = SnapshotTransfer::new(gateway);
        assert_eq!(
            transfer.transfer(&backup(&["projects", "ideas"])).await.unwrap(),
            1250
        );
    }

    #[tokio::test]
    async fn test_issues_snapshot_command() {
        let gateway = Arc::new(MemoryGateway::new().with_table("projects", 1000));
        let transfer = SnapshotTransfer::new(Arc::clone(&gateway) as Arc<dyn StoreGateway>);
        transfer.transfer(&backup(&["projects"])).await.unwrap();

        assert_eq!(
            gateway.executed(),
            vec!["SELECT ops_create_backup('bak_1', ARRAY['projects']::text[]);".to_string()]
        );
    }

    #[tokio::test]
    async fn test_snapshot_failure_propagates() {
        let gateway = Arc::new(MemoryGateway::new().with_table("projects", 1000));
        gateway.fail_scripts_containing("ops_create_backup");
        let transfer = SnapshotTransfer::new(gateway);
        assert!(transfer.transfer(&backup(&["projects"])).await.is_err());
    }

    #[tokio::test]
    async fn test_metadata_failure_propagates() {
        let gateway = Arc::new(MemoryGateway::new());
        gateway.fail_metadata(MetadataKind::TableSizes);
        let transfer = SnapshotTransfer::new(gateway);
        assert!(transfer.transfer(&backup(&[])).await.is_err());
    }

    #[test]
    fn test_render_custom_command_quotes_tables() {
        let transfer = SnapshotTransfer::new(Arc::new(MemoryGateway::new()))
            .with_command("CALL snapshot('{backup_id}', {tables})");
        assert_eq!(
            transfer.render(&backup(&["a", "o'brien"])),
            "CALL snapshot('bak_1', 'a', 'o''brien')"
        );
    }
}
