//! Opsdeck Command-Line Client
//!
//! Runs health scans, prints reports and trends, and manages alerts against
//! the control plane state directory.

mod commands;
mod formatter;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use commands::Command;
use formatter::OutputFormat;
use opsdeck_core::{ControlPlane, OpsConfig, PostgresGateway};

/// Opsdeck Command-Line Client
#[derive(Parser, Debug)]
#[command(name = "opsdeck")]
#[command(version, about = "Opsdeck data-tier operations CLI")]
pub struct Args {
    /// PostgreSQL connection URL of the backing store.
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Directory of the control plane state store.
    #[arg(short, long, default_value = "./opsdeck-data")]
    pub data_dir: PathBuf,

    /// Output format
    #[arg(long, global = true, default_value = "table", value_enum)]
    pub format: OutputFormat,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("opsdeck=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let gateway =
        PostgresGateway::connect(&args.database_url, 2, Duration::from_secs(args.timeout)).await?;
    let plane = ControlPlane::open(OpsConfig::new(args.data_dir), Arc::new(gateway))?;
    let formatter = formatter::create_formatter(args.format);

    let result = commands::execute(&plane, args.command, &*formatter).await;
    plane.shutdown().await?;

    println!("{}", result?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_interval_must_be_positive() {
        let parse = |interval: &str| {
            Args::try_parse_from([
                "opsdeck",
                "--database-url",
                "postgres://db/app",
                "monitor",
                "--interval",
                interval,
            ])
        };
        assert!(parse("0").is_err());
        assert!(matches!(
            parse("30").unwrap().command,
            Command::Monitor { interval: Some(30) }
        ));
    }
}
