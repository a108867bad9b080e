//! Error types for the device broker.
//!
//! `BrokerError` consolidates every failure the broker reports to its callers.
//! Faults raised by device classes during reconciliation never reach this type:
//! they are logged and the affected plugin or identifier is skipped.
//!
//! ## Error Categories
//!
//! - **Registry errors** - `NotFound`, `AlreadyRegistered`, `Denied`, `Busy`,
//!   `AdoptionFailed`
//! - **Leasing errors** - `NoMatch`, `Unavailable`, `NotLeased`,
//!   `UnknownAcquirer`, `Cancelled`
//! - **Administrative errors** - `AlreadyListed`, `NotListed`,
//!   `InvalidPattern`, `InvalidCriterion`

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the broker error type.
pub type BrokerResult<T> = std::result::Result<T, BrokerError>;

/// Which identifier filter an administrative operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    /// Identifiers eligible for tracking (empty means "everything").
    Allow,
    /// Identifiers that are never tracked.
    Deny,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ListKind::Allow => "allowlist",
            ListKind::Deny => "denylist",
        };
        write!(f, "{}", label)
    }
}

/// Primary error type for broker operations.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The identifier is not registered, or (for `add`) no device class owns it.
    #[error("unknown device \"{0}\"")]
    NotFound(String),

    /// `add` was called for an identifier that is already registered.
    #[error("device \"{0}\" already added")]
    AlreadyRegistered(String),

    /// The identifier is filtered out by the allow or deny list.
    #[error("device \"{0}\" is denied")]
    Denied(String),

    /// `remove` without force on a device with outstanding leases.
    #[error("device \"{0}\" is busy")]
    Busy(String),

    /// No lease is recorded for this device (or for this acquirer on it).
    #[error("device \"{device}\" not acquired{}", holder_suffix(.acquirer))]
    NotLeased {
        /// Device that was expected to hold a lease.
        device: String,
        /// Acquirer that was expected to hold it, if a specific one was named.
        acquirer: Option<String>,
    },

    /// `release_all` for an acquirer that holds nothing.
    #[error("unknown acquirer \"{0}\"")]
    UnknownAcquirer(String),

    /// The owning device class could not take ownership of the device.
    #[error("error accessing \"{device}\": {reason}")]
    AdoptionFailed {
        /// Device being adopted.
        device: String,
        /// Failure reported by the device class.
        reason: String,
    },

    /// Acquire criteria matched no registered device.
    #[error("no device matches the criteria")]
    NoMatch,

    /// Acquire criteria matched devices but all are at capacity.
    #[error("no matching device currently available")]
    Unavailable,

    /// A blocking acquire was abandoned by its cancellation signal.
    #[error("acquire cancelled before a device became available")]
    Cancelled,

    /// A match pattern failed to compile.
    #[error("invalid pattern for '{field}': {source}")]
    InvalidPattern {
        /// Field the pattern applies to.
        field: &'static str,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// A criterion key or value was not understood.
    #[error("invalid criterion: {0}")]
    InvalidCriterion(String),

    /// `*_include` on an identifier already on the list.
    #[error("device \"{device}\" already on the {list}")]
    AlreadyListed {
        /// Identifier being added.
        device: String,
        /// Target list.
        list: ListKind,
    },

    /// `*_exclude` on an identifier missing from the list.
    #[error("device \"{device}\" not on the {list}")]
    NotListed {
        /// Identifier being removed.
        device: String,
        /// Target list.
        list: ListKind,
    },
}

fn holder_suffix(acquirer: &Option<String>) -> String {
    match acquirer {
        Some(name) => format!(" by \"{}\"", name),
        None => String::new(),
    }
}

impl BrokerError {
    /// Build a `NotLeased` error for a specific acquirer.
    pub fn not_leased_by(device: impl Into<String>, acquirer: impl Into<String>) -> Self {
        BrokerError::NotLeased {
            device: device.into(),
            acquirer: Some(acquirer.into()),
        }
    }

    /// Build a `NotLeased` error for a device with no leases at all.
    pub fn not_leased(device: impl Into<String>) -> Self {
        BrokerError::NotLeased {
            device: device.into(),
            acquirer: None,
        }
    }

    /// Wrap a device class fault raised while adopting `device`.
    pub fn adoption(device: impl Into<String>, err: &anyhow::Error) -> Self {
        BrokerError::AdoptionFailed {
            device: device.into(),
            reason: format!("{:#}", err),
        }
    }
}
