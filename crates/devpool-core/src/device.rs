//! Device identity, capacity and handle types.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

// =============================================================================
// Device Identification
// =============================================================================

/// Globally unique device identifier (serial number or equivalent).
pub type DeviceId = String;

/// Opaque object through which an adopted device is operated.
///
/// Returned by [`crate::DeviceClass::adopt`] and handed back unchanged to
/// [`crate::DeviceClass::abandon`]. The broker never exposes it to clients, so
/// a device class may downcast it to its own concrete type.
pub type DeviceHandle = Box<dyn Any + Send>;

/// Identity and metadata record for one physical device.
///
/// Immutable once created. Compared and hashed by value, so the broker can keep
/// a reverse index from info back to identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Globally unique serial/identifier
    pub id: DeviceId,
    /// Device type or model (e.g., "phone-1")
    #[serde(rename = "type", default)]
    pub device_type: String,
    /// Software/firmware version
    #[serde(default)]
    pub sw: String,
    /// Hardware revision
    #[serde(default)]
    pub hw: String,
    /// Display or form-factor descriptor (e.g., "720x1280")
    #[serde(default)]
    pub display: String,
}

impl DeviceInfo {
    /// Create an info record with only the identifier set.
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            device_type: String::new(),
            sw: String::new(),
            hw: String::new(),
            display: String::new(),
        }
    }

    /// Set the device type.
    pub fn with_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = device_type.into();
        self
    }

    /// Set the software version.
    pub fn with_sw(mut self, sw: impl Into<String>) -> Self {
        self.sw = sw.into();
        self
    }

    /// Set the hardware revision.
    pub fn with_hw(mut self, hw: impl Into<String>) -> Self {
        self.hw = hw.into();
        self
    }

    /// Set the display descriptor.
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = display.into();
        self
    }
}

// =============================================================================
// Capacity
// =============================================================================

/// Maximum number of simultaneous leases a device class permits per device.
///
/// Serialized as an integer where `-1` means unlimited, so configuration files
/// can write `capacity = -1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Capacity {
    /// At most this many concurrent leases
    Limited(usize),
    /// No cap on concurrent leases
    Unlimited,
}

impl Capacity {
    /// Whether a device currently holding `leases` can take one more.
    pub fn admits(&self, leases: usize) -> bool {
        match self {
            Capacity::Limited(max) => leases < *max,
            Capacity::Unlimited => true,
        }
    }
}

impl Default for Capacity {
    fn default() -> Self {
        Capacity::Limited(1)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capacity::Limited(max) => write!(f, "{}", max),
            Capacity::Unlimited => write!(f, "unlimited"),
        }
    }
}

impl TryFrom<i64> for Capacity {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Capacity::Unlimited),
            v if v >= 0 => usize::try_from(v)
                .map(Capacity::Limited)
                .map_err(|e| e.to_string()),
            v => Err(format!(
                "invalid capacity {}: must be -1 (unlimited) or non-negative",
                v
            )),
        }
    }
}

impl From<Capacity> for i64 {
    fn from(capacity: Capacity) -> Self {
        match capacity {
            Capacity::Limited(max) => i64::try_from(max).unwrap_or(i64::MAX),
            Capacity::Unlimited => -1,
        }
    }
}
