//! Log output for the `devpool` binary.
//!
//! One fmt layer in pretty, compact or JSON form, filtered by `RUST_LOG` when
//! it is set and by `[application] log_level` otherwise. Broker events carry
//! `device`, `acquirer` and `plugin` fields, so the JSON form is the one to
//! feed into log aggregation.
//!
//! ```no_run
//! use devpool::{config::DevpoolConfig, logging};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DevpoolConfig::load()?;
//! logging::init_from_config(&config)?;
//! tracing::info!("broker starting");
//! # Ok(())
//! # }
//! ```

use crate::config::DevpoolConfig;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Rendering of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line, coloured when the terminal allows it
    Pretty,
    /// One line per event
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "unknown log format '{}' (expected pretty, compact or json)",
                s
            )),
        }
    }
}

/// Resolved logging settings.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    pub level: Level,
    pub format: OutputFormat,
    /// Colour codes in pretty output
    pub ansi: bool,
}

impl TracingConfig {
    pub fn new(level: Level, format: OutputFormat) -> Self {
        Self {
            level,
            format,
            ansi: format == OutputFormat::Pretty,
        }
    }

    /// Settings from the `[application]` section.
    pub fn from_config(config: &DevpoolConfig) -> Result<Self, String> {
        let level = config
            .application
            .log_level
            .parse::<Level>()
            .map_err(|_| format!("unknown log level '{}'", config.application.log_level))?;
        Ok(Self::new(level, config.application.log_format.parse()?))
    }
}

pub fn init_from_config(config: &DevpoolConfig) -> Result<(), String> {
    init(TracingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// Does nothing when a subscriber is already installed, so tests and
/// embedding applications may call it more than once.
pub fn init(config: TracingConfig) -> Result<(), String> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str().to_lowercase()));

    let layer = match config.format {
        OutputFormat::Pretty => fmt::layer()
            .pretty()
            .with_ansi(config.ansi)
            .with_filter(filter)
            .boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_target(false)
            .with_filter(filter)
            .boxed(),
        OutputFormat::Json => fmt::layer().json().with_filter(filter).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| format!("failed to install log subscriber: {}", e))
}
