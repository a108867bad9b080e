//! Mock Device Class for devpool
//!
//! This crate provides a simulated device family for testing the broker without
//! physical hardware. Devices are "plugged" and "unplugged" programmatically,
//! and every `adopt`/`abandon` call is recorded so tests can assert on the
//! exact ownership traffic the broker produced.
//!
//! # Example
//!
//! ```rust
//! use devpool_core::{Capacity, DeviceClass, DeviceInfo};
//! use devpool_driver_mock::MockDeviceClass;
//!
//! let class = MockDeviceClass::new("phones")
//!     .with_capacity(Capacity::Limited(2))
//!     .with_device(DeviceInfo::new("A").with_type("phone-1"));
//!
//! assert_eq!(class.rescan().unwrap(), vec!["A".to_string()]);
//!
//! class.unplug("A");
//! assert!(class.rescan().unwrap().is_empty());
//! ```
//!
//! # Fault Injection
//!
//! [`FaultConfig`] makes individual operations fail, mirroring the ways real
//! plugins misbehave (enumeration crashes, inaccessible devices, stuck release).

mod class;
pub mod faults;

pub use class::{MockDeviceClass, MockDeviceClassConfig, MockEvent, MockHandle};
pub use faults::{FaultConfig, FaultScenario, Operation};
