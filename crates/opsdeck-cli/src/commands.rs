//! Subcommand handling.

use std::time::Duration;

use clap::Subcommand;
use opsdeck_core::ControlPlane;
use tracing::info;

use crate::formatter::Formatter;

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one health scan, recording alerts and a trend point.
    Scan,
    /// Print a health report without recording anything.
    Report,
    /// Show recorded trend history.
    Trends {
        /// Show only the most recent points.
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Inspect or resolve alerts.
    #[command(subcommand)]
    Alerts(AlertsCommand),
    /// Scan periodically until interrupted.
    Monitor {
        /// Seconds between scans.
        #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
    },
}

/// Alert subcommands.
#[derive(Debug, Subcommand)]
pub enum AlertsCommand {
    /// List alerts.
    List {
        /// Include resolved alerts.
        #[arg(short, long)]
        all: bool,
    },
    /// Mark an alert resolved.
    Resolve {
        /// Alert id.
        id: String,
    },
}

/// Execute a one-shot command and return its output.
pub async fn execute(
    plane: &ControlPlane,
    command: Command,
    formatter: &dyn Formatter,
) -> anyhow::Result<String> {
    let health = plane.health();

    let output = match command {
        Command::Scan => formatter.format_report(&health.scan().await),
        Command::Report => formatter.format_report(&health.report().await),
        Command::Trends { limit } => formatter.format_trends(&health.trends().list(limit)),
        Command::Alerts(AlertsCommand::List { all }) => {
            formatter.format_alerts(&health.alerts().list(all))
        }
        Command::Alerts(AlertsCommand::Resolve { id }) => {
            let alert = health.alerts().resolve(&id)?;
            formatter.format_message(&format!("Resolved {}: {}", alert.id, alert.message))
        }
        Command::Monitor { interval } => {
            monitor(plane, interval, tokio::signal::ctrl_c()).await?;
            formatter.format_message("Monitoring stopped")
        }
    };

    Ok(output)
}

/// Run periodic scans until `until` completes, then stop monitoring.
pub async fn monitor<F>(plane: &ControlPlane, interval: Option<u64>, until: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    plane.start_monitoring(interval.map(Duration::from_secs))?;
    info!("Monitoring started, press Ctrl-C to stop");

    let waited = until.await;
    plane.stop_monitoring().await;
    waited?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatter::{JsonFormatter, TableFormatter};
    use opsdeck_core::{MemoryGateway, OpsConfig};
    use std::sync::Arc;

    fn plane() -> ControlPlane {
        let gateway = MemoryGateway::new()
            .with_table("orders", 4096)
            .with_connections(2);
        ControlPlane::open(OpsConfig::ephemeral(), Arc::new(gateway)).unwrap()
    }

    #[tokio::test]
    async fn test_report_does_not_record() {
        let plane = plane();
        let output = execute(&plane, Command::Report, &JsonFormatter).await.unwrap();
        let report: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(report["database"]["connections"], 2);
        assert!(plane.health().trends().is_empty());
    }

    #[tokio::test]
    async fn test_scan_records_trend() {
        let plane = plane();
        execute(&plane, Command::Scan, &TableFormatter).await.unwrap();
        execute(&plane, Command::Scan, &TableFormatter).await.unwrap();

        let output = execute(&plane, Command::Trends { limit: Some(1) }, &JsonFormatter)
            .await
            .unwrap();
        let points: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(points.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_alert() {
        let plane = plane();
        plane.telemetry().record("SELECT * FROM orders", 2_000.0);
        plane.health().scan().await;

        let id = plane
            .health()
            .alerts()
            .list(false)
            .into_iter()
            .find(|a| a.message.contains("slow queries"))
            .map(|a| a.id)
            .unwrap();

        let output = execute(
            &plane,
            Command::Alerts(AlertsCommand::Resolve { id: id.clone() }),
            &TableFormatter,
        )
        .await
        .unwrap();
        assert!(output.starts_with("Resolved"));

        let err = execute(
            &plane,
            Command::Alerts(AlertsCommand::Resolve { id }),
            &TableFormatter,
        )
        .await;
        assert!(err.is_err());

        let output = execute(
            &plane,
            Command::Alerts(AlertsCommand::List { all: false }),
            &TableFormatter,
        )
        .await
        .unwrap();
        assert!(!output.contains("slow queries"));
    }

    #[tokio::test]
    async fn test_monitor_stops_when_signalled() {
        let plane = plane();
        monitor(&plane, Some(60), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(())
        })
        .await
        .unwrap();

        assert!(!plane.is_monitoring());
        // The first scan runs as soon as monitoring starts.
        assert!(!plane.health().trends().is_empty());
    }

    #[tokio::test]
    async fn test_monitor_rejects_zero_interval() {
        let plane = plane();
        let result = monitor(&plane, Some(0), async { Ok(()) }).await;
        assert!(result.is_err());
        assert!(!plane.is_monitoring());
    }
}
