//! `devpool-core`
//!
//! Core types shared by the devpool broker and its device classes.
//!
//! ## Key Types
//!
//! - [`DeviceInfo`]: Immutable identity record for one physical device
//! - [`Capacity`]: How many simultaneous leases a device class permits
//! - [`DeviceClass`]: Discovery contract implemented once per device family
//! - [`MatchCriteria`]: Conjunctive filter used to select devices
//! - [`BrokerError`]: Typed failures surfaced by the broker
//!
//! ## Example
//!
//! ```rust
//! use devpool_core::{DeviceInfo, MatchCriteria, MatchField};
//!
//! let info = DeviceInfo::new("BE57D3-153").with_type("phone-1").with_sw("4.4");
//! let criteria = MatchCriteria::new()
//!     .with_pattern(MatchField::Type, "phone")
//!     .unwrap();
//! assert!(criteria.matches_info(&info));
//! ```

pub mod class;
pub mod criteria;
pub mod device;
pub mod error;

pub use class::{ApiMethod, DeviceClass};
pub use criteria::{MatchCriteria, MatchField};
pub use device::{Capacity, DeviceHandle, DeviceId, DeviceInfo};
pub use error::{BrokerError, BrokerResult, ListKind};
