//! Device broker for devpool.
//!
//! This crate owns the shared state of a device pool:
//!
//! - [`Devices`] - registry, reconciliation and the acquire/release protocol
//! - [`AccessLists`] - allow/deny filters applied to discovered identifiers
//! - [`Acquisition`] - read-only view of one outstanding lease
//!
//! Device families plug in through [`devpool_core::DeviceClass`] and are
//! registered explicitly with [`Devices::register_class`].

pub mod access;
pub mod ledger;
mod plugins;
pub mod registry;

pub use access::AccessLists;
pub use ledger::Acquisition;
pub use registry::{Devices, RescanReport};
