//! Per-acquirer lease history.
//!
//! The ledger maps acquirer -> device -> stack of lease start times. Releasing
//! pops the most recent start, and empty entries are pruned so an acquirer
//! holding nothing does not appear at all.

use chrono::{DateTime, Utc};
use devpool_core::DeviceId;
use serde::Serialize;
use std::collections::BTreeMap;

/// Outstanding leases of one device by one acquirer, as reported by
/// [`crate::Devices::acquisitions`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acquisition {
    /// Acquirer name (empty string for anonymous)
    pub acquirer: String,
    /// Leased device
    pub device: DeviceId,
    /// Start time of each outstanding lease, oldest first
    pub since: Vec<DateTime<Utc>>,
}

/// Acquirer -> device -> lease start stack.
#[derive(Debug, Default)]
pub(crate) struct LeaseLedger {
    leases: BTreeMap<String, BTreeMap<DeviceId, Vec<DateTime<Utc>>>>,
}

impl LeaseLedger {
    pub(crate) fn record(&mut self, acquirer: &str, device: &str, since: DateTime<Utc>) {
        self.leases
            .entry(acquirer.to_string())
            .or_default()
            .entry(device.to_string())
            .or_default()
            .push(since);
    }

    /// Pop the most recent lease of `device` by `acquirer`.
    pub(crate) fn pop(&mut self, acquirer: &str, device: &str) -> Option<DateTime<Utc>> {
        let devices = self.leases.get_mut(acquirer)?;
        let stack = devices.get_mut(device)?;
        let since = stack.pop();
        if stack.is_empty() {
            devices.remove(device);
        }
        if devices.is_empty() {
            self.leases.remove(acquirer);
        }
        since
    }

    /// First acquirer (in name order) holding a lease on `device`.
    pub(crate) fn holder_of(&self, device: &str) -> Option<String> {
        self.leases
            .iter()
            .find(|(_, devices)| devices.contains_key(device))
            .map(|(acquirer, _)| acquirer.clone())
    }

    /// Every lease held by `acquirer`, one item per lease.
    pub(crate) fn holdings(&self, acquirer: &str) -> Vec<DeviceId> {
        self.leases
            .get(acquirer)
            .map(|devices| {
                devices
                    .iter()
                    .flat_map(|(device, stack)| std::iter::repeat(device.clone()).take(stack.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Leases on `device` across all acquirers.
    #[cfg(test)]
    pub(crate) fn count_for(&self, device: &str) -> usize {
        self.leases
            .values()
            .filter_map(|devices| devices.get(device))
            .map(Vec::len)
            .sum()
    }

    pub(crate) fn acquirers(&self) -> Vec<String> {
        self.leases.keys().cloned().collect()
    }

    /// One row per (acquirer, device) pair, sorted by acquirer then device.
    pub(crate) fn acquisitions(&self) -> Vec<Acquisition> {
        self.leases
            .iter()
            .flat_map(|(acquirer, devices)| {
                devices.iter().map(move |(device, stack)| Acquisition {
                    acquirer: acquirer.clone(),
                    device: device.clone(),
                    since: stack.clone(),
                })
            })
            .collect()
    }

    pub(crate) fn clear(&mut self) {
        self.leases.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_stack_pops_latest_first() {
        let mut ledger = LeaseLedger::default();
        let first = Utc::now();
        let second = first + Duration::seconds(5);
        ledger.record("a", "X", first);
        ledger.record("a", "X", second);

        assert_eq!(ledger.count_for("X"), 2);
        assert_eq!(ledger.pop("a", "X"), Some(second));
        assert_eq!(ledger.pop("a", "X"), Some(first));
        assert_eq!(ledger.pop("a", "X"), None);
    }

    #[test]
    fn test_empty_entries_are_pruned() {
        let mut ledger = LeaseLedger::default();
        ledger.record("a", "X", Utc::now());
        ledger.pop("a", "X");

        assert!(ledger.acquirers().is_empty());
        assert!(ledger.acquisitions().is_empty());
    }

    #[test]
    fn test_holdings_and_holder() {
        let mut ledger = LeaseLedger::default();
        let now = Utc::now();
        ledger.record("b", "X", now);
        ledger.record("a", "Y", now);
        ledger.record("a", "Y", now);

        assert_eq!(ledger.holdings("a"), vec!["Y", "Y"]);
        assert_eq!(ledger.holder_of("X"), Some("b".to_string()));
        assert_eq!(ledger.holder_of("Z"), None);
        assert_eq!(ledger.acquirers(), vec!["a", "b"]);
    }

    #[test]
    fn test_acquisitions_sorted() {
        let mut ledger = LeaseLedger::default();
        let now = Utc::now();
        ledger.record("b", "X", now);
        ledger.record("", "Y", now);

        let listed: Vec<_> = ledger
            .acquisitions()
            .into_iter()
            .map(|a| (a.acquirer, a.device))
            .collect();
        assert_eq!(
            listed,
            vec![
                (String::new(), "Y".to_string()),
                ("b".to_string(), "X".to_string())
            ]
        );
    }

    #[test]
    fn test_repeated_leases_share_one_row() {
        let mut ledger = LeaseLedger::default();
        let first = Utc::now();
        let second = first + Duration::seconds(5);
        ledger.record("a", "X", first);
        ledger.record("a", "X", second);
        ledger.record("b", "X", first);

        let rows = ledger.acquisitions();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].acquirer, "a");
        assert_eq!(rows[0].since, vec![first, second]);
        assert_eq!(rows[1].since, vec![first]);

        ledger.pop("a", "X");
        assert_eq!(ledger.acquisitions()[0].since, vec![first]);
    }
}
