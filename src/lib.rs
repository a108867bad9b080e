//! # devpool
//!
//! Application layer of the device leasing broker. The broker itself lives in
//! `devpool-broker`; this crate wires it to configuration, logging and the
//! bundled device classes.
//!
//! - **`config`**: Figment-based loading and validation of `config/devpool.toml`.
//! - **`logging`**: `tracing-subscriber` setup in pretty, compact or JSON format.
//! - **`pool`**: builds a [`devpool_broker::Devices`] from configuration and
//!   runs the periodic rescan loop.

pub mod config;
pub mod logging;
pub mod pool;

pub use devpool_broker::{AccessLists, Acquisition, Devices, RescanReport};
pub use devpool_core::{BrokerError, BrokerResult, DeviceClass, DeviceInfo, MatchCriteria};
