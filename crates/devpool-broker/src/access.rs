//! Allow and deny lists gating which identifiers the broker tracks.

use devpool_core::{BrokerError, BrokerResult, DeviceId, ListKind};
use std::collections::BTreeSet;

/// Identifier filters owned by one broker instance.
///
/// When the allow list is non-empty only its members are eligible. The deny
/// list is applied after it and always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessLists {
    allow: BTreeSet<DeviceId>,
    deny: BTreeSet<DeviceId>,
}

impl AccessLists {
    /// Lists that admit every identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build lists from initial members (typically loaded from configuration).
    pub fn from_lists<A, D>(allow: A, deny: D) -> Self
    where
        A: IntoIterator<Item = DeviceId>,
        D: IntoIterator<Item = DeviceId>,
    {
        Self {
            allow: allow.into_iter().collect(),
            deny: deny.into_iter().collect(),
        }
    }

    /// Whether `id` may be adopted.
    pub fn permits(&self, id: &str) -> bool {
        (self.allow.is_empty() || self.allow.contains(id)) && !self.deny.contains(id)
    }

    /// Add `id` to a list; fails if it is already there.
    pub fn include(&mut self, kind: ListKind, id: &str) -> BrokerResult<()> {
        if !self.set_mut(kind).insert(id.to_string()) {
            return Err(BrokerError::AlreadyListed {
                device: id.to_string(),
                list: kind,
            });
        }
        Ok(())
    }

    /// Remove `id` from a list; fails if it is absent.
    pub fn exclude(&mut self, kind: ListKind, id: &str) -> BrokerResult<()> {
        if !self.set_mut(kind).remove(id) {
            return Err(BrokerError::NotListed {
                device: id.to_string(),
                list: kind,
            });
        }
        Ok(())
    }

    /// Sorted members of a list.
    pub fn list(&self, kind: ListKind) -> Vec<DeviceId> {
        match kind {
            ListKind::Allow => self.allow.iter().cloned().collect(),
            ListKind::Deny => self.deny.iter().cloned().collect(),
        }
    }

    fn set_mut(&mut self, kind: ListKind) -> &mut BTreeSet<DeviceId> {
        match kind {
            ListKind::Allow => &mut self.allow,
            ListKind::Deny => &mut self.deny,
        }
    }
}
