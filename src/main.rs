//! CLI Entry Point for devpool
//!
//! Provides command-line access to the device broker:
//! - One-shot discovery and queries (`scan`, `plugins`, `match`)
//! - A demonstration lease (`acquire`)
//! - Periodic reconciliation until interrupted (`daemon`)
//!
//! # Usage
//!
//! ```bash
//! devpool scan
//! devpool match type=phone free=true
//! devpool acquire type=phone --acquirer ci --wait 30
//! devpool --config lab.toml daemon
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use devpool::config::{DevpoolConfig, DEFAULT_CONFIG_PATH};
use devpool::{logging, pool, Devices, MatchCriteria};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "devpool")]
#[command(about = "Discover shared devices and lease them to concurrent users", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation pass and print the registry
    Scan,

    /// List registered device classes
    Plugins,

    /// Print devices matching key=value criteria
    Match {
        /// Criteria such as `type=phone.*` or `free=true`
        #[arg(value_parser = parse_criterion)]
        criteria: Vec<(String, String)>,
    },

    /// Lease a matching device, print it, then release it
    Acquire {
        /// Criteria such as `type=phone.*` or `free=true`
        #[arg(value_parser = parse_criterion)]
        criteria: Vec<(String, String)>,

        /// Acquirer name recorded in the lease ledger
        #[arg(long, default_value = "")]
        acquirer: String,

        /// Wait up to this many seconds for a device to become available
        #[arg(long)]
        wait: Option<u64>,
    },

    /// Rescan periodically until Ctrl-C
    Daemon,
}

/// Parse a single `key=value` criterion.
fn parse_criterion(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid criterion '{}': expected key=value", s))?;
    if key.is_empty() {
        return Err(format!("invalid criterion '{}': empty key", s));
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = DevpoolConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.validate()?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let devices = pool::build_devices(&config);

    match cli.command {
        Commands::Scan => scan(&devices),
        Commands::Plugins => {
            for name in devices.list_plugins() {
                println!("{}", name);
            }
            Ok(())
        }
        Commands::Match { criteria } => {
            devices.rescan();
            let criteria = MatchCriteria::from_pairs(criteria)?;
            print_devices(&devices, devices.match_devices(&criteria))
        }
        Commands::Acquire {
            criteria,
            acquirer,
            wait,
        } => acquire_once(&devices, criteria, &acquirer, wait).await,
        Commands::Daemon => {
            let interval = config.broker.rescan_interval();
            tracing::info!(
                name = %config.application.name,
                interval_secs = interval.as_secs(),
                "daemon started, press Ctrl-C to stop"
            );
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to listen for Ctrl-C");
                }
            };
            pool::run_rescans(Arc::clone(&devices), interval, shutdown).await;
            Ok(())
        }
    }
}

fn scan(devices: &Devices) -> Result<()> {
    let report = devices.rescan();
    let infos = devices
        .all()
        .iter()
        .map(|id| devices.info(id))
        .collect::<Result<Vec<_>, _>>()?;
    let output = json!({ "report": report, "devices": infos });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_devices(devices: &Devices, ids: Vec<String>) -> Result<()> {
    let infos = ids
        .iter()
        .map(|id| devices.info(id))
        .collect::<Result<Vec<_>, _>>()?;
    println!("{}", serde_json::to_string_pretty(&infos)?);
    Ok(())
}

async fn acquire_once(
    devices: &Devices,
    criteria: Vec<(String, String)>,
    acquirer: &str,
    wait: Option<u64>,
) -> Result<()> {
    devices.rescan();
    let criteria = MatchCriteria::from_pairs(criteria)?;

    let id = match wait {
        Some(secs) => {
            devices
                .acquire_timeout(&criteria, acquirer, Duration::from_secs(secs))
                .await?
        }
        None => devices.try_acquire(&criteria, acquirer)?,
    };

    let info = devices.acquired(&id)?;
    let api: Vec<String> = devices.api(&id)?.iter().map(|m| m.to_string()).collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({ "device": info, "api": api }))?
    );

    devices.release(&id, acquirer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_criterion() {
        assert_eq!(
            parse_criterion("type=phone.*").unwrap(),
            ("type".to_string(), "phone.*".to_string())
        );
        // Only the first '=' separates key and value
        assert_eq!(
            parse_criterion("id=a=b").unwrap(),
            ("id".to_string(), "a=b".to_string())
        );
        assert!(parse_criterion("type").is_err());
        assert!(parse_criterion("=x").is_err());
    }

    #[test]
    fn test_cli_parses_acquire() {
        let cli = Cli::try_parse_from([
            "devpool", "acquire", "type=phone", "free=true", "--acquirer", "ci", "--wait", "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Acquire {
                criteria,
                acquirer,
                wait,
            } => {
                assert_eq!(criteria.len(), 2);
                assert_eq!(acquirer, "ci");
                assert_eq!(wait, Some(5));
            }
            _ => panic!("expected acquire"),
        }
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }
}
