//! The device registry and leasing engine.
//!
//! [`Devices`] keeps every adopted device together with its lease count and
//! the per-acquirer lease history. All state sits behind one
//! `parking_lot::Mutex`; device class calls are made while holding it, so no
//! caller ever observes a half-reconciled registry.
//!
//! Blocking acquirers never hold the lock while parked. They wait on a
//! `tokio::sync::Notify` that is signalled by every release, rescan, add and
//! remove, and re-evaluate their criteria from scratch when woken.

use crate::access::AccessLists;
use crate::ledger::{Acquisition, LeaseLedger};
use crate::plugins::PluginRegistry;
use chrono::Utc;
use devpool_core::{
    ApiMethod, BrokerError, BrokerResult, DeviceClass, DeviceHandle, DeviceId, DeviceInfo,
    ListKind, MatchCriteria,
};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

// =============================================================================
// Registry State
// =============================================================================

/// An adopted device.
struct Entry {
    handle: DeviceHandle,
    info: DeviceInfo,
    /// Class that adopted the device and will abandon it
    class: Arc<dyn DeviceClass>,
    leases: usize,
}

impl Entry {
    fn available(&self) -> bool {
        self.class.capacity().admits(self.leases)
    }
}

#[derive(Default)]
struct State {
    plugins: PluginRegistry,
    access: AccessLists,
    entries: BTreeMap<DeviceId, Entry>,
    /// Reverse index, info -> identifier
    infos: HashMap<DeviceInfo, DeviceId>,
    ledger: LeaseLedger,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescanReport {
    /// Newly adopted devices
    pub found: Vec<DeviceId>,
    /// Devices that were already registered and are still present
    pub kept: Vec<DeviceId>,
    /// Devices that vanished (or became ineligible) and were abandoned
    pub forgot: Vec<DeviceId>,
    /// Newly seen devices whose adoption failed
    pub failed: Vec<DeviceId>,
}

impl State {
    fn entry(&self, id: &str) -> BrokerResult<&Entry> {
        self.entries
            .get(id)
            .ok_or_else(|| BrokerError::NotFound(id.to_string()))
    }

    fn adopt_entry(&mut self, id: &str, class: Arc<dyn DeviceClass>) -> BrokerResult<()> {
        let (handle, info) = class
            .adopt(id)
            .map_err(|err| BrokerError::adoption(id, &err))?;

        if let Some(other) = self.infos.get(&info) {
            let reason = format!("device info duplicates registered device \"{}\"", other);
            if let Err(err) = class.abandon(&info, handle) {
                warn!(device = id, plugin = class.name(), error = %format!("{:#}", err), "abandon failed");
            }
            return Err(BrokerError::AdoptionFailed {
                device: id.to_string(),
                reason,
            });
        }

        self.infos.insert(info.clone(), id.to_string());
        self.entries.insert(
            id.to_string(),
            Entry {
                handle,
                info,
                class,
                leases: 0,
            },
        );
        Ok(())
    }

    /// Release every lease on `id`, abandon it and drop both index entries.
    fn remove_entry(&mut self, id: &str) -> BrokerResult<()> {
        while self.entry(id)?.leases > 0 {
            self.release_lease(id, None)?;
        }

        let entry = self
            .entries
            .remove(id)
            .ok_or_else(|| BrokerError::NotFound(id.to_string()))?;
        self.infos.remove(&entry.info);

        if let Err(err) = entry.class.abandon(&entry.info, entry.handle) {
            warn!(
                device = id,
                plugin = entry.class.name(),
                error = %format!("{:#}", err),
                "abandon failed"
            );
        }
        Ok(())
    }

    fn matching(&self, criteria: &MatchCriteria) -> Vec<DeviceId> {
        self.entries
            .iter()
            .filter(|(_, entry)| {
                criteria.matches_info(&entry.info)
                    && criteria.matches_availability(entry.available())
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    fn lease_one(
        &mut self,
        criteria: &MatchCriteria,
        acquirer: &str,
        started: Instant,
    ) -> BrokerResult<DeviceId> {
        let matching = self.matching(criteria);
        if matching.is_empty() {
            return Err(BrokerError::NoMatch);
        }

        let available: Vec<&DeviceId> = matching
            .iter()
            .filter(|id| self.entries.get(id.as_str()).is_some_and(Entry::available))
            .collect();
        let id = match available.choose(&mut rand::thread_rng()) {
            Some(id) => (*id).clone(),
            None => return Err(BrokerError::Unavailable),
        };

        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| BrokerError::NotFound(id.clone()))?;
        entry.leases += 1;
        self.ledger.record(acquirer, &id, Utc::now());

        info!(
            device = %id,
            acquirer = %acquirer,
            waited_ms = started.elapsed().as_millis() as u64,
            "device acquired"
        );
        Ok(id)
    }

    /// Pop one lease on `id`. With no acquirer named, any current holder's
    /// lease is released. Returns the acquirer the lease belonged to.
    fn release_lease(&mut self, id: &str, acquirer: Option<&str>) -> BrokerResult<String> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| BrokerError::NotFound(id.to_string()))?;
        if entry.leases == 0 {
            return Err(BrokerError::not_leased(id));
        }

        let acquirer = match acquirer {
            Some(acquirer) => acquirer.to_string(),
            None => self
                .ledger
                .holder_of(id)
                .ok_or_else(|| BrokerError::not_leased(id))?,
        };
        let since = self
            .ledger
            .pop(&acquirer, id)
            .ok_or_else(|| BrokerError::not_leased_by(id, acquirer.as_str()))?;
        entry.leases -= 1;

        let held = Utc::now() - since;
        info!(
            device = id,
            acquirer = %acquirer,
            held_ms = held.num_milliseconds(),
            "device released"
        );
        Ok(acquirer)
    }

    fn reconcile(&mut self) -> RescanReport {
        let present = self.plugins.scan();
        let eligible: BTreeSet<DeviceId> = present
            .into_iter()
            .filter(|id| self.access.permits(id))
            .collect();

        let mut report = RescanReport::default();

        for id in &eligible {
            if self.entries.contains_key(id) {
                debug!(device = %id, "rescan kept");
                report.kept.push(id.clone());
                continue;
            }
            let Some(class) = self.plugins.owner(id) else {
                continue;
            };
            let plugin = class.name().to_string();
            match self.adopt_entry(id, class) {
                Ok(()) => {
                    info!(device = %id, plugin = %plugin, "rescan found");
                    report.found.push(id.clone());
                }
                Err(err) => {
                    warn!(device = %id, plugin = %plugin, error = %err, "rescan found but failed connecting");
                    report.failed.push(id.clone());
                }
            }
        }

        let gone: Vec<DeviceId> = self
            .entries
            .keys()
            .filter(|id| !eligible.contains(*id))
            .cloned()
            .collect();
        for id in gone {
            match self.remove_entry(&id) {
                Ok(()) => {
                    info!(device = %id, "rescan forgot");
                    report.forgot.push(id);
                }
                Err(err) => warn!(device = %id, error = %err, "failed to forget device"),
            }
        }

        report
    }
}

// =============================================================================
// Devices
// =============================================================================

/// Device broker: discovers devices through registered classes and leases
/// them to concurrent acquirers under each class's capacity limit.
///
/// Acquirer names are free-form; the empty string is the anonymous acquirer.
///
/// # Example
///
/// ```rust
/// use devpool_broker::Devices;
/// use devpool_core::{DeviceInfo, MatchCriteria, MatchField};
/// use devpool_driver_mock::MockDeviceClass;
/// use std::sync::Arc;
///
/// let devices = Devices::new();
/// devices.register_class(Arc::new(
///     MockDeviceClass::new("phones").with_device(DeviceInfo::new("A").with_type("phone-1")),
/// ));
/// devices.rescan();
///
/// let criteria = MatchCriteria::new().with_pattern(MatchField::Type, "phone").unwrap();
/// let id = devices.try_acquire(&criteria, "alice").unwrap();
/// assert_eq!(id, "A");
/// devices.release(&id, "alice").unwrap();
/// ```
#[derive(Default)]
pub struct Devices {
    state: Mutex<State>,
    changed: Notify,
}

impl Devices {
    /// Create an empty broker with permissive access lists.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty broker with the given initial access lists.
    pub fn with_access(access: AccessLists) -> Self {
        Self {
            state: Mutex::new(State {
                access,
                ..State::default()
            }),
            changed: Notify::new(),
        }
    }

    // -------------------------------------------------------------------------
    // Plugins & reconciliation
    // -------------------------------------------------------------------------

    /// Register a device class. Its devices appear on the next [`rescan`](Self::rescan).
    pub fn register_class(&self, class: Arc<dyn DeviceClass>) {
        self.state.lock().plugins.register(class);
    }

    /// Names of registered device classes in registration order.
    pub fn list_plugins(&self) -> Vec<String> {
        self.state.lock().plugins.names()
    }

    /// Reconcile the registry with the devices every class currently reports.
    ///
    /// Newly seen, permitted identifiers are adopted; registered identifiers
    /// no longer reported (or no longer permitted) have all their leases
    /// released and are abandoned. Class faults are logged, never returned.
    pub fn rescan(&self) -> RescanReport {
        let report = self.state.lock().reconcile();
        debug!(
            found = report.found.len(),
            kept = report.kept.len(),
            forgot = report.forgot.len(),
            failed = report.failed.len(),
            "rescan complete"
        );
        self.changed.notify_waiters();
        report
    }

    /// Adopt one device seen by the last rescan.
    pub fn add(&self, id: &str) -> BrokerResult<()> {
        {
            let mut state = self.state.lock();
            let class = state
                .plugins
                .owner(id)
                .ok_or_else(|| BrokerError::NotFound(id.to_string()))?;
            if !state.access.permits(id) {
                return Err(BrokerError::Denied(id.to_string()));
            }
            if state.entries.contains_key(id) {
                return Err(BrokerError::AlreadyRegistered(id.to_string()));
            }
            state.adopt_entry(id, class)?;
        }
        info!(device = id, "device added");
        self.changed.notify_waiters();
        Ok(())
    }

    /// Abandon and forget a device.
    ///
    /// Fails with [`BrokerError::Busy`] while leases are outstanding unless
    /// `force` is set, in which case every lease is released first.
    pub fn remove(&self, id: &str, force: bool) -> BrokerResult<()> {
        {
            let mut state = self.state.lock();
            if state.entry(id)?.leases > 0 && !force {
                return Err(BrokerError::Busy(id.to_string()));
            }
            state.remove_entry(id)?;
        }
        info!(device = id, force, "device removed");
        self.changed.notify_waiters();
        Ok(())
    }

    /// Forget all registry state without calling any device class.
    ///
    /// Handles are dropped in place. Registered classes and access lists are
    /// kept.
    pub fn reset(&self) {
        {
            let mut state = self.state.lock();
            for (id, entry) in &state.entries {
                if entry.leases > 0 {
                    warn!(device = %id, leases = entry.leases, "dropping leased device on reset");
                }
            }
            state.entries.clear();
            state.infos.clear();
            state.ledger.clear();
        }
        self.changed.notify_waiters();
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Identifiers of registered devices satisfying every criterion, sorted.
    pub fn match_devices(&self, criteria: &MatchCriteria) -> Vec<DeviceId> {
        self.state.lock().matching(criteria)
    }

    /// Whether `id` can take another lease.
    pub fn available(&self, id: &str) -> BrokerResult<bool> {
        Ok(self.state.lock().entry(id)?.available())
    }

    /// Copy of the device's info record.
    pub fn info(&self, id: &str) -> BrokerResult<DeviceInfo> {
        Ok(self.state.lock().entry(id)?.info.clone())
    }

    /// Operations the owning class declares for this device's handle.
    pub fn api(&self, id: &str) -> BrokerResult<Vec<ApiMethod>> {
        Ok(self.state.lock().entry(id)?.class.api().to_vec())
    }

    /// Number of outstanding leases on `id`.
    pub fn lease_count(&self, id: &str) -> BrokerResult<usize> {
        Ok(self.state.lock().entry(id)?.leases)
    }

    /// Every registered identifier, sorted.
    pub fn all(&self) -> Vec<DeviceId> {
        self.state.lock().entries.keys().cloned().collect()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True when no device is registered.
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    // -------------------------------------------------------------------------
    // Leasing
    // -------------------------------------------------------------------------

    /// Lease a matching device without waiting.
    ///
    /// Returns [`BrokerError::NoMatch`] when nothing matches and
    /// [`BrokerError::Unavailable`] when every match is at capacity. Among
    /// available matches one is picked uniformly at random.
    pub fn try_acquire(&self, criteria: &MatchCriteria, acquirer: &str) -> BrokerResult<DeviceId> {
        self.state
            .lock()
            .lease_one(criteria, acquirer, Instant::now())
    }

    /// Lease a matching device, optionally waiting for one to become available.
    ///
    /// With `blocking` set, an `Unavailable` outcome parks the caller until
    /// the registry changes and then re-evaluates the criteria. There is no
    /// timeout; drop the future, or use [`acquire_until`](Self::acquire_until)
    /// or [`acquire_timeout`](Self::acquire_timeout), to give up.
    pub async fn acquire(
        &self,
        criteria: &MatchCriteria,
        acquirer: &str,
        blocking: bool,
    ) -> BrokerResult<DeviceId> {
        let started = Instant::now();
        loop {
            // Register interest before checking so a release in between is not lost.
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let outcome = self.state.lock().lease_one(criteria, acquirer, started);
            match outcome {
                Err(BrokerError::Unavailable) if blocking => {}
                outcome => return outcome,
            }

            debug!(acquirer = %acquirer, "acquire blocked");
            notified.await;
        }
    }

    /// Blocking acquire that gives up with [`BrokerError::Cancelled`] once
    /// `cancel` completes.
    pub async fn acquire_until<F>(
        &self,
        criteria: &MatchCriteria,
        acquirer: &str,
        cancel: F,
    ) -> BrokerResult<DeviceId>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            outcome = self.acquire(criteria, acquirer, true) => outcome,
            () = cancel => {
                debug!(acquirer = %acquirer, "acquire cancelled");
                Err(BrokerError::Cancelled)
            }
        }
    }

    /// Blocking acquire bounded by `timeout`.
    pub async fn acquire_timeout(
        &self,
        criteria: &MatchCriteria,
        acquirer: &str,
        timeout: Duration,
    ) -> BrokerResult<DeviceId> {
        self.acquire_until(criteria, acquirer, tokio::time::sleep(timeout))
            .await
    }

    /// Release the most recent lease `acquirer` holds on `id`.
    pub fn release(&self, id: &str, acquirer: &str) -> BrokerResult<()> {
        self.state.lock().release_lease(id, Some(acquirer))?;
        self.changed.notify_waiters();
        Ok(())
    }

    /// Release one lease on `id` on behalf of whichever acquirer holds it.
    ///
    /// Returns the acquirer whose lease was released.
    pub fn release_any(&self, id: &str) -> BrokerResult<String> {
        let acquirer = self.state.lock().release_lease(id, None)?;
        self.changed.notify_waiters();
        Ok(acquirer)
    }

    /// Release every lease held by `acquirer` in one step.
    ///
    /// Returns the released identifiers, one item per lease.
    pub fn release_all(&self, acquirer: &str) -> BrokerResult<Vec<DeviceId>> {
        let released = {
            let mut state = self.state.lock();
            let holdings = state.ledger.holdings(acquirer);
            if holdings.is_empty() {
                return Err(BrokerError::UnknownAcquirer(acquirer.to_string()));
            }
            for id in &holdings {
                state.release_lease(id, Some(acquirer))?;
            }
            holdings
        };
        self.changed.notify_waiters();
        Ok(released)
    }

    /// Info of `id` if it currently has at least one lease.
    pub fn acquired(&self, id: &str) -> BrokerResult<DeviceInfo> {
        let state = self.state.lock();
        let entry = state.entry(id)?;
        if entry.leases == 0 {
            return Err(BrokerError::not_leased(id));
        }
        Ok(entry.info.clone())
    }

    /// Acquirers holding at least one lease, sorted.
    pub fn acquirers(&self) -> Vec<String> {
        self.state.lock().ledger.acquirers()
    }

    /// Outstanding leases grouped per (acquirer, device), sorted by acquirer
    /// then device. Each row lists its lease start times oldest first.
    pub fn acquisitions(&self) -> Vec<Acquisition> {
        self.state.lock().ledger.acquisitions()
    }

    // -------------------------------------------------------------------------
    // Access lists
    // -------------------------------------------------------------------------

    /// Deny an identifier. Registered devices stay until the next rescan.
    pub fn denylist_include(&self, id: &str) -> BrokerResult<()> {
        self.state.lock().access.include(ListKind::Deny, id)?;
        info!(device = id, "denylisted");
        Ok(())
    }

    /// Lift a denial.
    pub fn denylist_exclude(&self, id: &str) -> BrokerResult<()> {
        self.state.lock().access.exclude(ListKind::Deny, id)?;
        info!(device = id, "removed from denylist");
        Ok(())
    }

    /// Sorted denied identifiers.
    pub fn denylist(&self) -> Vec<DeviceId> {
        self.state.lock().access.list(ListKind::Deny)
    }

    /// Restrict tracking to the allow list, adding `id` to it.
    pub fn allowlist_include(&self, id: &str) -> BrokerResult<()> {
        self.state.lock().access.include(ListKind::Allow, id)?;
        info!(device = id, "allowlisted");
        Ok(())
    }

    /// Remove `id` from the allow list.
    pub fn allowlist_exclude(&self, id: &str) -> BrokerResult<()> {
        self.state.lock().access.exclude(ListKind::Allow, id)?;
        info!(device = id, "removed from allowlist");
        Ok(())
    }

    /// Sorted allowed identifiers. Empty means every identifier is allowed.
    pub fn allowlist(&self) -> Vec<DeviceId> {
        self.state.lock().access.list(ListKind::Allow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use devpool_core::{Capacity, MatchField};
    use devpool_driver_mock::{FaultScenario, MockDeviceClass, MockEvent, Operation};
    use tracing_test::traced_test;

    fn broker_with(class: MockDeviceClass) -> (Devices, Arc<MockDeviceClass>) {
        let class = Arc::new(class);
        let devices = Devices::new();
        devices.register_class(Arc::clone(&class) as Arc<dyn DeviceClass>);
        devices.rescan();
        (devices, class)
    }

    fn any() -> MatchCriteria {
        MatchCriteria::new()
    }

    /// Lease count must equal the ledger total for every device.
    fn assert_ledger_consistent(devices: &Devices) {
        let state = devices.state.lock();
        for (id, entry) in &state.entries {
            assert_eq!(entry.leases, state.ledger.count_for(id), "device {}", id);
        }
        for (info, id) in &state.infos {
            assert_eq!(&state.entries[id].info, info);
        }
        assert_eq!(state.infos.len(), state.entries.len());
    }

    #[test]
    fn test_rescan_adopts_present_devices() {
        let (devices, class) = broker_with(
            MockDeviceClass::new("phones")
                .with_device(DeviceInfo::new("A"))
                .with_device(DeviceInfo::new("B")),
        );

        assert_eq!(devices.all(), vec!["A", "B"]);
        assert_eq!(devices.len(), 2);
        assert_eq!(class.adopted(), vec!["A", "B"]);
        assert_eq!(devices.list_plugins(), vec!["phones"]);
        assert_ledger_consistent(&devices);
    }

    #[test]
    fn test_rescan_report() {
        let (devices, class) = broker_with(
            MockDeviceClass::new("phones")
                .with_device(DeviceInfo::new("A"))
                .with_device(DeviceInfo::new("B")),
        );
        class.plug(DeviceInfo::new("C"));
        class.unplug("A");
        class.faults().inject(FaultScenario::AdoptDevice("C".into()));
        class.plug(DeviceInfo::new("D"));

        let report = devices.rescan();
        assert_eq!(report.found, vec!["D"]);
        assert_eq!(report.kept, vec!["B"]);
        assert_eq!(report.forgot, vec!["A"]);
        assert_eq!(report.failed, vec!["C"]);
    }

    #[test]
    fn test_failing_class_rescan_forgets_its_devices() {
        let (devices, class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        class.faults().inject(FaultScenario::Always(Operation::Rescan));

        let report = devices.rescan();
        assert_eq!(report.forgot, vec!["A"]);
        assert!(devices.is_empty());
    }

    #[test]
    fn test_abandon_failure_still_forgets() {
        let (devices, class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        class.faults().inject(FaultScenario::Always(Operation::Abandon));

        devices.remove("A", false).unwrap();
        assert!(devices.is_empty());
        assert!(matches!(devices.info("A"), Err(BrokerError::NotFound(_))));
    }

    /// Reports the same info record for every identifier it adopts.
    struct SameInfoClass;

    impl DeviceClass for SameInfoClass {
        fn name(&self) -> &str {
            "same-info"
        }

        fn rescan(&self) -> anyhow::Result<Vec<DeviceId>> {
            Ok(vec!["A".to_string(), "B".to_string()])
        }

        fn adopt(&self, _id: &str) -> anyhow::Result<(DeviceHandle, DeviceInfo)> {
            Ok((Box::new(()), DeviceInfo::new("shared").with_type("clone")))
        }

        fn abandon(&self, _info: &DeviceInfo, _handle: DeviceHandle) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_info_is_rejected() {
        let devices = Devices::new();
        devices.register_class(Arc::new(SameInfoClass));

        let report = devices.rescan();
        assert_eq!(report.found, vec!["A"]);
        assert_eq!(report.failed, vec!["B"]);
        assert_ledger_consistent(&devices);
    }

    #[test]
    fn test_add_preconditions() {
        let (devices, class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));

        assert!(matches!(devices.add("Z"), Err(BrokerError::NotFound(_))));
        assert!(matches!(
            devices.add("A"),
            Err(BrokerError::AlreadyRegistered(_))
        ));

        devices.remove("A", false).unwrap();
        devices.denylist_include("A").unwrap();
        assert!(matches!(devices.add("A"), Err(BrokerError::Denied(_))));

        devices.denylist_exclude("A").unwrap();
        devices.add("A").unwrap();
        assert_eq!(devices.all(), vec!["A"]);
        assert_eq!(
            class.events(),
            vec![
                MockEvent::Adopted("A".into()),
                MockEvent::Abandoned("A".into()),
                MockEvent::Adopted("A".into()),
            ]
        );
    }

    #[test]
    fn test_add_surfaces_adoption_failure() {
        let (devices, class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        devices.remove("A", false).unwrap();
        class.faults().inject(FaultScenario::AdoptDevice("A".into()));

        let err = devices.add("A").unwrap_err();
        assert!(matches!(err, BrokerError::AdoptionFailed { .. }));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_remove_busy_unless_forced() {
        let (devices, _class) = broker_with(
            MockDeviceClass::new("phones")
                .with_capacity(Capacity::Limited(3))
                .with_device(DeviceInfo::new("A")),
        );
        devices.try_acquire(&any(), "a").unwrap();
        devices.try_acquire(&any(), "b").unwrap();

        assert!(matches!(devices.remove("A", false), Err(BrokerError::Busy(_))));
        devices.remove("A", true).unwrap();

        assert!(devices.acquirers().is_empty());
        assert!(devices.acquisitions().is_empty());
        assert!(matches!(devices.remove("A", true), Err(BrokerError::NotFound(_))));
    }

    #[test]
    fn test_release_errors() {
        let (devices, _class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));

        assert!(matches!(
            devices.release("Z", "a"),
            Err(BrokerError::NotFound(_))
        ));
        assert!(matches!(
            devices.release("A", "a"),
            Err(BrokerError::NotLeased { acquirer: None, .. })
        ));

        devices.try_acquire(&any(), "a").unwrap();
        let err = devices.release("A", "b").unwrap_err();
        assert_eq!(err.to_string(), "device \"A\" not acquired by \"b\"");
        assert_ledger_consistent(&devices);
    }

    #[test]
    fn test_release_any_finds_holder() {
        let (devices, _class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        devices.try_acquire(&any(), "carol").unwrap();

        assert_eq!(devices.release_any("A").unwrap(), "carol");
        assert_eq!(devices.lease_count("A").unwrap(), 0);
    }

    #[test]
    fn test_release_all_releases_every_lease() {
        let (devices, _class) = broker_with(
            MockDeviceClass::new("phones")
                .with_capacity(Capacity::Unlimited)
                .with_device(DeviceInfo::new("A"))
                .with_device(DeviceInfo::new("B")),
        );
        for _ in 0..3 {
            devices.try_acquire(&any(), "a").unwrap();
        }
        devices.try_acquire(&any(), "b").unwrap();

        let released = devices.release_all("a").unwrap();
        assert_eq!(released.len(), 3);
        assert_eq!(devices.acquirers(), vec!["b"]);
        assert!(matches!(
            devices.release_all("a"),
            Err(BrokerError::UnknownAcquirer(_))
        ));
        assert_ledger_consistent(&devices);
    }

    #[test]
    fn test_acquired_and_available() {
        let (devices, _class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));

        assert!(devices.available("A").unwrap());
        assert!(matches!(
            devices.acquired("A"),
            Err(BrokerError::NotLeased { .. })
        ));

        devices.try_acquire(&any(), "").unwrap();
        assert!(!devices.available("A").unwrap());
        assert_eq!(devices.acquired("A").unwrap().id, "A");
        assert_eq!(devices.acquirers(), vec![""]);
        assert!(matches!(
            devices.available("Z"),
            Err(BrokerError::NotFound(_))
        ));
    }

    #[test]
    fn test_zero_capacity_never_available() {
        let (devices, _class) = broker_with(
            MockDeviceClass::new("parked")
                .with_capacity(Capacity::Limited(0))
                .with_device(DeviceInfo::new("A")),
        );
        assert!(matches!(
            devices.try_acquire(&any(), "a"),
            Err(BrokerError::Unavailable)
        ));
    }

    #[test]
    fn test_free_and_busy_criteria() {
        let (devices, _class) = broker_with(
            MockDeviceClass::new("phones")
                .with_device(DeviceInfo::new("A"))
                .with_device(DeviceInfo::new("B")),
        );
        let id = devices.try_acquire(&any(), "a").unwrap();

        let busy = devices.match_devices(&MatchCriteria::new().with_busy(true));
        assert_eq!(busy, vec![id.clone()]);
        let free = devices.match_devices(&MatchCriteria::new().with_free(true));
        assert_eq!(free.len(), 1);
        assert_ne!(free[0], id);

        let err = devices
            .try_acquire(&MatchCriteria::new().with_busy(true), "b")
            .unwrap_err();
        assert!(matches!(err, BrokerError::Unavailable));
    }

    #[test]
    fn test_api_from_owning_class() {
        let (devices, _class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        let api = devices.api("A").unwrap();
        assert!(api.iter().any(|m| m.name == "shell"));
    }

    #[test]
    fn test_reset_skips_class_calls() {
        let (devices, class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        devices.try_acquire(&any(), "a").unwrap();

        devices.reset();
        assert!(devices.is_empty());
        assert!(devices.acquirers().is_empty());
        assert_eq!(class.events(), vec![MockEvent::Adopted("A".into())]);
        assert_eq!(devices.list_plugins(), vec!["phones"]);
    }

    #[test]
    fn test_allowlist_limits_rescan() {
        let class = Arc::new(
            MockDeviceClass::new("phones")
                .with_device(DeviceInfo::new("A"))
                .with_device(DeviceInfo::new("B")),
        );
        let devices = Devices::with_access(AccessLists::from_lists(vec!["B".to_string()], vec![]));
        devices.register_class(class);
        devices.rescan();
        assert_eq!(devices.all(), vec!["B"]);

        devices.allowlist_include("A").unwrap();
        assert_eq!(devices.allowlist(), vec!["A", "B"]);
        devices.rescan();
        assert_eq!(devices.all(), vec!["A", "B"]);

        devices.allowlist_exclude("B").unwrap();
        assert!(matches!(
            devices.allowlist_exclude("B"),
            Err(BrokerError::NotListed { .. })
        ));
        devices.rescan();
        assert_eq!(devices.all(), vec!["A"]);
    }

    #[test]
    fn test_collision_last_class_wins() {
        let first = Arc::new(MockDeviceClass::new("first").with_device(DeviceInfo::new("X")));
        let second = Arc::new(MockDeviceClass::new("second").with_device(DeviceInfo::new("X")));
        let devices = Devices::new();
        devices.register_class(Arc::clone(&first) as Arc<dyn DeviceClass>);
        devices.register_class(Arc::clone(&second) as Arc<dyn DeviceClass>);

        devices.rescan();
        assert!(first.adopted().is_empty());
        assert_eq!(second.adopted(), vec!["X"]);
    }

    #[traced_test]
    #[test]
    fn test_lease_durations_are_logged() {
        let (devices, _class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        devices.try_acquire(&any(), "alice").unwrap();
        devices.release("A", "alice").unwrap();

        assert!(logs_contain("rescan found"));
        assert!(logs_contain("device acquired"));
        assert!(logs_contain("waited_ms"));
        assert!(logs_contain("device released"));
        assert!(logs_contain("held_ms"));
    }

    #[traced_test]
    #[test]
    fn test_collision_is_logged() {
        let devices = Devices::new();
        devices.register_class(Arc::new(
            MockDeviceClass::new("first").with_device(DeviceInfo::new("X")),
        ));
        devices.register_class(Arc::new(
            MockDeviceClass::new("second").with_device(DeviceInfo::new("X")),
        ));
        devices.rescan();

        assert!(logs_contain("device reported by more than one class"));
    }

    #[tokio::test]
    async fn test_blocking_acquire_waits_for_release() {
        let (devices, _class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        let devices = Arc::new(devices);
        devices.try_acquire(&any(), "a").unwrap();

        let waiter = {
            let devices = Arc::clone(&devices);
            tokio::spawn(async move { devices.acquire(&any(), "b", true).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        devices.release("A", "a").unwrap();
        let id = waiter.await.unwrap().unwrap();
        assert_eq!(id, "A");
        assert_eq!(devices.acquirers(), vec!["b"]);
    }

    #[tokio::test]
    async fn test_acquire_timeout_cancels() {
        let (devices, _class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        devices.try_acquire(&any(), "a").unwrap();

        let err = devices
            .acquire_timeout(&any(), "b", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::Cancelled));
        assert_eq!(devices.lease_count("A").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blocking_acquire_no_match_returns_immediately() {
        let (devices, _class) =
            broker_with(MockDeviceClass::new("phones").with_device(DeviceInfo::new("A")));
        let criteria = MatchCriteria::new()
            .with_pattern(MatchField::Id, "Z")
            .unwrap();

        let err = devices.acquire(&criteria, "a", true).await.unwrap_err();
        assert!(matches!(err, BrokerError::NoMatch));
    }
}
