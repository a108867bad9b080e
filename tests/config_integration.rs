//! End-to-end: configuration file -> broker -> leases.

#![allow(clippy::unwrap_used)]

use devpool::config::{ClassDefinition, DevpoolConfig};
use devpool::{pool, BrokerError, MatchCriteria};
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

const LAB: &str = r#"
[broker]
denylist = ["T-BROKEN"]

[[classes]]
kind = "mock"
name = "handhelds"
devices = [
    { id = "P-1", type = "phone-1" },
    { id = "P-2", type = "phone-2" },
    { id = "T-1", type = "tablet-1" },
    { id = "T-BROKEN", type = "tablet-1" },
]

[[classes]]
kind = "mock"
name = "boards"
capacity = -1
devices = [{ id = "B-1", type = "devboard" }]
"#;

fn load(contents: &str) -> DevpoolConfig {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    let config = DevpoolConfig::load_from(file.path()).unwrap();
    config.validate().unwrap();
    config
}

#[test]
#[serial]
fn test_bundled_config_is_valid() {
    let config = DevpoolConfig::load_from(
        std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/devpool.toml"),
    )
    .unwrap();
    config.validate().unwrap();

    let kinds: Vec<_> = config
        .classes
        .iter()
        .map(|c| matches!(c, ClassDefinition::Mock(_)))
        .collect();
    assert_eq!(kinds, vec![true, false]);
}

#[test]
#[serial]
fn test_configured_pool_leases_devices() {
    let devices = pool::build_devices(&load(LAB));
    let report = devices.rescan();

    assert_eq!(report.found, vec!["B-1", "P-1", "P-2", "T-1"]);
    assert_eq!(devices.list_plugins(), vec!["handhelds", "boards"]);

    let phones = MatchCriteria::from_pairs([("type", "phone")]).unwrap();
    let first = devices.try_acquire(&phones, "ci").unwrap();
    let second = devices.try_acquire(&phones, "ci").unwrap();
    assert_ne!(first, second);
    assert!(matches!(
        devices.try_acquire(&phones, "dev"),
        Err(BrokerError::Unavailable)
    ));

    let boards = MatchCriteria::from_pairs([("type", "devboard")]).unwrap();
    for acquirer in ["ci", "dev", "nightly"] {
        assert_eq!(devices.try_acquire(&boards, acquirer).unwrap(), "B-1");
    }

    assert_eq!(devices.release_all("ci").unwrap().len(), 3);
    assert_eq!(devices.acquirers(), vec!["dev", "nightly"]);
}

#[tokio::test]
#[serial]
async fn test_waiting_acquirer_served_by_release() {
    let devices = pool::build_devices(&load(LAB));
    devices.rescan();

    let tablet = MatchCriteria::from_pairs([("type", "tablet")]).unwrap();
    assert_eq!(devices.try_acquire(&tablet, "a").unwrap(), "T-1");

    let releaser = {
        let devices = std::sync::Arc::clone(&devices);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            devices.release("T-1", "a").unwrap();
        })
    };

    let id = devices
        .acquire_timeout(&tablet, "b", Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(id, "T-1");
    releaser.await.unwrap();
}
