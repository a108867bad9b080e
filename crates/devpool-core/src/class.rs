//! Device Class Contract
//!
//! A [`DeviceClass`] is the discovery plugin for one device family. The broker
//! is its only caller and invokes it synchronously while holding the registry
//! lock, so implementations should keep each call short.
//!
//! # Lifecycle
//!
//! ```text
//!   rescan() ──► [ids present] ──► adopt(id) ──► (handle, info) held by broker
//!                                                        │
//!   device vanished / removed  ◄──────── abandon(info, handle)
//! ```
//!
//! # Example: Implementing a Device Class
//!
//! ```rust
//! use devpool_core::{Capacity, DeviceClass, DeviceHandle, DeviceId, DeviceInfo};
//!
//! struct LoopbackClass;
//!
//! impl DeviceClass for LoopbackClass {
//!     fn name(&self) -> &str { "loopback" }
//!     fn capacity(&self) -> Capacity { Capacity::Unlimited }
//!
//!     fn rescan(&self) -> anyhow::Result<Vec<DeviceId>> {
//!         Ok(vec!["lo0".to_string()])
//!     }
//!
//!     fn adopt(&self, id: &str) -> anyhow::Result<(DeviceHandle, DeviceInfo)> {
//!         let info = DeviceInfo::new(id).with_type("loopback");
//!         Ok((Box::new(()), info))
//!     }
//!
//!     fn abandon(&self, _info: &DeviceInfo, _handle: DeviceHandle) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//! }
//! ```

use crate::device::{Capacity, DeviceHandle, DeviceId, DeviceInfo};
use std::fmt;

/// One operation a device handle exposes, as declared by its device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiMethod {
    /// Method name
    pub name: &'static str,
    /// Parameter names in call order
    pub params: &'static [&'static str],
}

impl ApiMethod {
    /// Declare a method with its parameter names.
    pub const fn new(name: &'static str, params: &'static [&'static str]) -> Self {
        Self { name, params }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.params.join(", "))
    }
}

/// Discovery plugin for one device family.
///
/// Implementations decide which devices are present, take and release
/// exclusive ownership of them, and declare how many concurrent leases each
/// device tolerates.
pub trait DeviceClass: Send + Sync {
    /// Name used in logs and plugin listings (e.g., "android", "serial_by_id").
    fn name(&self) -> &str;

    /// Maximum number of simultaneous leases for any device of this class.
    fn capacity(&self) -> Capacity {
        Capacity::default()
    }

    /// Enumerate identifiers of devices currently present.
    ///
    /// Best effort: an error is logged by the broker and treated as "no
    /// devices from this class" for the current reconciliation pass.
    fn rescan(&self) -> anyhow::Result<Vec<DeviceId>>;

    /// Take exclusive ownership of a device.
    ///
    /// Called at most once per identifier between matching `abandon` calls.
    fn adopt(&self, id: &str) -> anyhow::Result<(DeviceHandle, DeviceInfo)>;

    /// Release ownership of a device previously returned by `adopt`.
    fn abandon(&self, info: &DeviceInfo, handle: DeviceHandle) -> anyhow::Result<()>;

    /// Operations a handle of this class offers, for introspection tools.
    fn api(&self) -> &[ApiMethod] {
        &[]
    }
}
