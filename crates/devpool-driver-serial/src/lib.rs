//! Serial-by-id Device Class for devpool
//!
//! Discovers USB serial adapters through the stable symlinks udev maintains
//! in `/dev/serial/by-id`, so a device keeps its identifier across reboots
//! and replugs even when its `/dev/ttyUSBn` node changes.
//!
//! Adopting a device resolves its link to the current device node; the
//! [`SerialHandle`] carries both paths for whoever opens the port.

pub mod by_id;

pub use by_id::ByIdName;

use devpool_core::{ApiMethod, Capacity, DeviceClass, DeviceHandle, DeviceId, DeviceInfo};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Directory udev populates with by-id links on Linux.
pub const DEFAULT_BY_ID_DIR: &str = "/dev/serial/by-id";

const SERIAL_API: &[ApiMethod] = &[
    ApiMethod::new("open", &["baud_rate"]),
    ApiMethod::new("device_path", &[]),
];

/// Errors raised while discovering or adopting serial adapters.
#[derive(Debug, Error)]
pub enum ByIdError {
    /// No by-id link currently produces this identifier.
    #[error("serial device not present: {0}")]
    NotPresent(String),

    /// The device is already owned by a broker.
    #[error("serial device already adopted: {0}")]
    AlreadyAdopted(String),

    /// The handle passed to `abandon` was not issued by this class.
    #[error("foreign handle for serial device {0}")]
    ForeignHandle(String),

    /// IO error while reading the directory or resolving a link.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle to an adopted serial adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialHandle {
    /// The by-id symlink
    pub link: PathBuf,
    /// Device node the link resolved to at adoption (e.g., `/dev/ttyUSB0`)
    pub device: PathBuf,
}

/// Configuration for a [`SerialByIdClass`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialByIdConfig {
    /// Plugin name
    #[serde(default = "default_name")]
    pub name: String,
    /// Directory holding by-id links
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    /// Leases per device (`-1` = unlimited)
    #[serde(default)]
    pub capacity: Capacity,
}

fn default_name() -> String {
    "serial_by_id".to_string()
}

fn default_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BY_ID_DIR)
}

impl Default for SerialByIdConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            dir: default_dir(),
            capacity: Capacity::default(),
        }
    }
}

/// Device class for USB serial adapters.
pub struct SerialByIdClass {
    name: String,
    dir: PathBuf,
    capacity: Capacity,
    adopted: Mutex<BTreeSet<DeviceId>>,
}

impl SerialByIdClass {
    /// Class scanning `dir` with exclusive leases.
    pub fn new(name: impl Into<String>, dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            dir: dir.into(),
            capacity: Capacity::default(),
            adopted: Mutex::new(BTreeSet::new()),
        }
    }

    /// Build a class from its configuration.
    pub fn from_config(config: &SerialByIdConfig) -> Self {
        Self::new(&config.name, config.dir.clone()).with_capacity(config.capacity)
    }

    /// Set the per-device lease capacity.
    pub fn with_capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Directory being scanned.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Present adapters keyed by identifier. A missing directory means no
    /// adapters are plugged in.
    fn links(&self) -> Result<BTreeMap<DeviceId, (ByIdName, PathBuf)>, ByIdError> {
        let mut links = BTreeMap::new();
        if !self.dir.is_dir() {
            tracing::debug!(plugin = %self.name, dir = %self.dir.display(), "by-id directory not available");
            return Ok(links);
        }

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(parsed) = ByIdName::parse(&file_name.to_string_lossy()) else {
                continue;
            };
            links.insert(parsed.device_id(), (parsed, entry.path()));
        }
        Ok(links)
    }
}

impl DeviceClass for SerialByIdClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> Capacity {
        self.capacity
    }

    fn rescan(&self) -> anyhow::Result<Vec<DeviceId>> {
        Ok(self.links()?.into_keys().collect())
    }

    fn adopt(&self, id: &str) -> anyhow::Result<(DeviceHandle, DeviceInfo)> {
        let (parsed, link) = self
            .links()?
            .remove(id)
            .ok_or_else(|| ByIdError::NotPresent(id.to_string()))?;
        let device = std::fs::canonicalize(&link)?;

        if !self.adopted.lock().insert(id.to_string()) {
            return Err(ByIdError::AlreadyAdopted(id.to_string()).into());
        }

        let tty = device
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let info = DeviceInfo::new(id)
            .with_type(parsed.device_type())
            .with_hw(format!("if{}", parsed.interface))
            .with_display(tty);

        tracing::info!(plugin = %self.name, device = id, path = %device.display(), "serial adapter adopted");
        Ok((Box::new(SerialHandle { link, device }), info))
    }

    fn abandon(&self, info: &DeviceInfo, handle: DeviceHandle) -> anyhow::Result<()> {
        self.adopted.lock().remove(&info.id);
        handle
            .downcast::<SerialHandle>()
            .map_err(|_| ByIdError::ForeignHandle(info.id.clone()))?;
        Ok(())
    }

    fn api(&self) -> &[ApiMethod] {
        SERIAL_API
    }
}
