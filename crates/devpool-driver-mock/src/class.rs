//! Mock device class implementation.

use crate::faults::{FaultConfig, Operation};
use anyhow::{anyhow, bail};
use devpool_core::{ApiMethod, Capacity, DeviceClass, DeviceHandle, DeviceId, DeviceInfo};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const MOCK_API: &[ApiMethod] = &[
    ApiMethod::new("shell", &["command"]),
    ApiMethod::new("reboot", &[]),
    ApiMethod::new("push", &["source", "destination"]),
];

/// Handle returned from [`MockDeviceClass::adopt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockHandle {
    /// Identifier of the adopted device
    pub id: DeviceId,
}

/// Ownership traffic recorded by the mock class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    /// `adopt` succeeded for this identifier
    Adopted(DeviceId),
    /// `abandon` was called for this identifier
    Abandoned(DeviceId),
}

/// Configuration for a [`MockDeviceClass`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDeviceClassConfig {
    /// Plugin name
    pub name: String,
    /// Leases per device (`-1` = unlimited)
    #[serde(default)]
    pub capacity: Capacity,
    /// Devices initially plugged in
    #[serde(default)]
    pub devices: Vec<DeviceInfo>,
}

/// Simulated device family with a programmable set of present devices.
///
/// Every device in the catalogue has a [`DeviceInfo`]; only those marked
/// present are reported by `rescan`. Adopting an identifier that is not in
/// the catalogue yields an info record of type `"mock"`.
pub struct MockDeviceClass {
    name: String,
    capacity: Capacity,
    catalogue: RwLock<BTreeMap<DeviceId, DeviceInfo>>,
    present: RwLock<BTreeSet<DeviceId>>,
    adopted: Mutex<BTreeSet<DeviceId>>,
    faults: Arc<FaultConfig>,
    events: Mutex<Vec<MockEvent>>,
}

impl MockDeviceClass {
    /// Create an empty class with exclusive (capacity 1) devices.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: Capacity::default(),
            catalogue: RwLock::new(BTreeMap::new()),
            present: RwLock::new(BTreeSet::new()),
            adopted: Mutex::new(BTreeSet::new()),
            faults: Arc::new(FaultConfig::none()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Build a class from its configuration; all listed devices start present.
    pub fn from_config(config: &MockDeviceClassConfig) -> Self {
        config
            .devices
            .iter()
            .cloned()
            .fold(Self::new(&config.name).with_capacity(config.capacity), |class, info| {
                class.with_device(info)
            })
    }

    /// Set the per-device lease capacity.
    pub fn with_capacity(mut self, capacity: Capacity) -> Self {
        self.capacity = capacity;
        self
    }

    /// Add a device to the catalogue and plug it in.
    pub fn with_device(self, info: DeviceInfo) -> Self {
        self.plug(info);
        self
    }

    /// Share a fault configuration with this class.
    pub fn with_faults(mut self, faults: Arc<FaultConfig>) -> Self {
        self.faults = faults;
        self
    }

    /// Fault configuration consulted by every operation.
    pub fn faults(&self) -> &FaultConfig {
        &self.faults
    }

    /// Plug in a device, replacing any catalogue entry with the same id.
    pub fn plug(&self, info: DeviceInfo) {
        let id = info.id.clone();
        self.catalogue.write().insert(id.clone(), info);
        self.present.write().insert(id);
    }

    /// Unplug a device. Its catalogue entry is kept so it can reappear.
    pub fn unplug(&self, id: &str) {
        self.present.write().remove(id);
    }

    /// Replace the set of present identifiers.
    pub fn set_present<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<DeviceId>,
    {
        *self.present.write() = ids.into_iter().map(Into::into).collect();
    }

    /// Identifiers currently adopted by a broker.
    pub fn adopted(&self) -> Vec<DeviceId> {
        self.adopted.lock().iter().cloned().collect()
    }

    /// Snapshot of every adopt/abandon call so far.
    pub fn events(&self) -> Vec<MockEvent> {
        self.events.lock().clone()
    }

    fn info_for(&self, id: &str) -> DeviceInfo {
        self.catalogue
            .read()
            .get(id)
            .cloned()
            .unwrap_or_else(|| DeviceInfo::new(id).with_type("mock"))
    }
}

impl DeviceClass for MockDeviceClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> Capacity {
        self.capacity
    }

    fn rescan(&self) -> anyhow::Result<Vec<DeviceId>> {
        self.faults.check(Operation::Rescan, None)?;
        Ok(self.present.read().iter().cloned().collect())
    }

    fn adopt(&self, id: &str) -> anyhow::Result<(DeviceHandle, DeviceInfo)> {
        self.faults.check(Operation::Adopt, Some(id))?;

        if !self.present.read().contains(id) {
            bail!("device {} is not connected", id);
        }
        if !self.adopted.lock().insert(id.to_string()) {
            bail!("device {} is already adopted", id);
        }

        self.events.lock().push(MockEvent::Adopted(id.to_string()));
        tracing::debug!(plugin = %self.name, device = id, "mock device adopted");

        let handle = MockHandle { id: id.to_string() };
        Ok((Box::new(handle), self.info_for(id)))
    }

    fn abandon(&self, info: &DeviceInfo, handle: DeviceHandle) -> anyhow::Result<()> {
        let handle = handle
            .downcast::<MockHandle>()
            .map_err(|_| anyhow!("handle for {} was not issued by {}", info.id, self.name))?;

        self.events.lock().push(MockEvent::Abandoned(handle.id.clone()));
        self.adopted.lock().remove(&handle.id);
        self.faults.check(Operation::Abandon, Some(&handle.id))?;

        tracing::debug!(plugin = %self.name, device = %handle.id, "mock device abandoned");
        Ok(())
    }

    fn api(&self) -> &[ApiMethod] {
        MOCK_API
    }
}
