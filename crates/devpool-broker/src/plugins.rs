//! Registered device classes and the identifier -> owner map.

use devpool_core::{DeviceClass, DeviceId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Ordered device classes plus the owner of every identifier last seen.
#[derive(Default)]
pub(crate) struct PluginRegistry {
    classes: Vec<Arc<dyn DeviceClass>>,
    owners: HashMap<DeviceId, Arc<dyn DeviceClass>>,
}

impl PluginRegistry {
    pub(crate) fn register(&mut self, class: Arc<dyn DeviceClass>) {
        tracing::info!(plugin = class.name(), capacity = %class.capacity(), "device class registered");
        self.classes.push(class);
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.classes.iter().map(|c| c.name().to_string()).collect()
    }

    pub(crate) fn owner(&self, id: &str) -> Option<Arc<dyn DeviceClass>> {
        self.owners.get(id).cloned()
    }

    /// Ask every class for its present devices and rebuild the owner map.
    ///
    /// A class whose `rescan` fails contributes nothing this pass. When two
    /// classes report the same identifier the one registered later wins.
    pub(crate) fn scan(&mut self) -> BTreeSet<DeviceId> {
        let mut owners: HashMap<DeviceId, Arc<dyn DeviceClass>> = HashMap::new();

        for class in &self.classes {
            let ids = match class.rescan() {
                Ok(ids) => ids,
                Err(err) => {
                    tracing::error!(plugin = class.name(), error = %format!("{:#}", err), "rescan failed");
                    continue;
                }
            };

            for id in ids {
                if let Some(previous) = owners.insert(id.clone(), Arc::clone(class)) {
                    tracing::warn!(
                        device = %id,
                        plugin = class.name(),
                        previous = previous.name(),
                        "device reported by more than one class"
                    );
                }
            }
        }

        let found = owners.keys().cloned().collect();
        self.owners = owners;
        found
    }
}
