//! Broker assembly from configuration and the periodic rescan loop.

use crate::config::DevpoolConfig;
use devpool_broker::Devices;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Build a broker with the configured access lists and device classes.
///
/// No rescan is performed; the caller decides when discovery starts.
pub fn build_devices(config: &DevpoolConfig) -> Arc<Devices> {
    let devices = Devices::with_access(config.broker.access_lists());
    for class in &config.classes {
        devices.register_class(class.build());
    }
    info!(
        classes = config.classes.len(),
        allowlist = config.broker.allowlist.len(),
        denylist = config.broker.denylist.len(),
        "broker configured"
    );
    Arc::new(devices)
}

/// Rescan every `interval` until `shutdown` completes.
///
/// The first rescan happens immediately. Returns the number of passes run.
pub async fn run_rescans<F>(devices: Arc<Devices>, interval: Duration, shutdown: F) -> u64
where
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let mut passes = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = devices.rescan();
                passes += 1;
                if !report.found.is_empty() || !report.forgot.is_empty() {
                    info!(
                        found = ?report.found,
                        forgot = ?report.forgot,
                        total = devices.len(),
                        "device set changed"
                    );
                }
            }
            () = &mut shutdown => {
                info!(passes, "rescan loop stopped");
                return passes;
            }
        }
    }
}
