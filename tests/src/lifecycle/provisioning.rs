use std::sync::Arc;
use std::time::Duration;

use devtarget_common::config::{OsCheck, TargetConfig};
use devtarget_common::TargetError;
use devtarget_core::sdk::GnSdk;
use devtarget_core::{DeviceTarget, LifecycleState, Services};

use super::support::{config, image_dir, Scenario, PAVE_STDERR};

fn named(node_name: &str, config: TargetConfig) -> TargetConfig {
    TargetConfig {
        node_name: Some(node_name.to_string()),
        ..config
    }
}

#[tokio::test(start_paused = true)]
async fn missing_device_under_update_is_paved_from_zedboot() {
    let scenario = Scenario::new();
    scenario.paving_succeeds(0);
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(named("lab-1", config(OsCheck::Update, &images)));

    target.start().await.unwrap();

    let journal = &scenario.journal;
    assert_eq!(journal.count("discovery.resolve lab-1"), 1);
    assert_eq!(journal.count("process.run pave"), 1);
    assert!(journal.contains("process.run pave --authorized-keys /home/dev/.ssh/fuchsia_authorized_keys -n lab-1 -1"));
    assert_eq!(journal.count("discovery.resolve my-device-1234"), 1);
    assert!(!journal.contains("session.run cat"));
    assert_eq!(target.identity().node_name.as_deref(), Some("my-device-1234"));
    assert!(target.is_started());
}

#[tokio::test]
async fn missing_device_under_check_is_reported() {
    let scenario = Scenario::new();
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(named("lab-1", config(OsCheck::Check, &images)));

    let err = target.start().await.unwrap_err();

    assert!(
        matches!(&err, TargetError::DeviceNotFound { node_name: Some(name) } if name == "lab-1"),
        "{err:?}"
    );
    assert!(!scenario.journal.contains("process.run"));
}

#[tokio::test]
async fn failed_paving_stops_before_rediscovery() {
    let scenario = Scenario::lab_device("core", "20231201.3.1");
    scenario.processes.clone().exiting("pave.sh", 1, "", PAVE_STDERR);
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(config(OsCheck::Update, &images));

    let err = target.start().await.unwrap_err();

    assert!(matches!(err, TargetError::PaveFailed { exit_code: Some(1) }), "{err:?}");
    assert!(err.to_string().contains("could not pave device"), "{err}");
    assert!(!scenario.journal.contains("discovery.resolve my-device-1234"));
    assert!(!target.is_started());
    assert_eq!(target.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn paving_output_without_node_name_is_fatal() {
    let scenario = Scenario::lab_device("core", "20231201.3.1");
    scenario
        .processes
        .clone()
        .exiting("pave.sh", 0, "", "[bootserver] Transfer ends successfully.\n");
    let images = image_dir("core", "20240101.1.1");

    let err = scenario
        .target(config(OsCheck::Update, &images))
        .start()
        .await
        .unwrap_err();

    assert!(matches!(err, TargetError::NodeNameParse), "{err:?}");
    assert_eq!(err.to_string(), "could not parse nodename from paving output");
}

#[tokio::test(start_paused = true)]
async fn device_lost_after_paving_exhausts_the_budget() {
    let scenario = Scenario::lab_device("core", "20231201.3.1");
    scenario.processes.clone().exiting("pave.sh", 0, "", PAVE_STDERR);
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(config(OsCheck::Update, &images));
    let started = tokio::time::Instant::now();

    let err = target.start().await.unwrap_err();

    assert!(
        matches!(&err, TargetError::NotDiscoveredAfterProvision { node_name, attempts: 30 } if node_name == "my-device-1234"),
        "{err:?}"
    );
    assert_eq!(scenario.journal.count("process.run pave"), 1);
    assert_eq!(scenario.journal.count("discovery.resolve my-device-1234"), 30);
    assert!(started.elapsed() < Duration::from_secs(30 * 4 + 1));
}

#[tokio::test(start_paused = true)]
async fn authorized_keys_come_from_the_sdk() {
    let scenario = Scenario::new();
    scenario.paving_succeeds(0);
    scenario
        .processes
        .clone()
        .exiting("bash", 0, "/sdk/.ssh/authorized_keys\n", "");
    let images = image_dir("core", "20240101.1.1");
    let config = TargetConfig {
        authorized_keys: None,
        ..named("lab-1", config(OsCheck::Update, &images))
    };
    let processes = Arc::new(scenario.processes.clone());
    let mut target = DeviceTarget::new(
        config,
        Services {
            discovery: Arc::new(scenario.discovery.clone()),
            sessions: Arc::new(scenario.sessions.clone()),
            processes: processes.clone(),
            sdk: Some(GnSdk::new("/sdk/bin/fuchsia-common.sh", processes)),
        },
    )
    .unwrap();

    target.start().await.unwrap();

    assert!(scenario.journal.contains("process.run bash -c"));
    assert!(scenario
        .journal
        .contains("process.run pave --authorized-keys /sdk/.ssh/authorized_keys -n lab-1 -1"));
}

#[tokio::test]
async fn paving_without_authorized_keys_is_a_configuration_error() {
    let scenario = Scenario::new();
    let images = image_dir("core", "20240101.1.1");
    let config = TargetConfig {
        authorized_keys: None,
        ..named("lab-1", config(OsCheck::Update, &images))
    };

    let err = scenario.target(config).start().await.unwrap_err();

    assert!(matches!(err, TargetError::Configuration(_)), "{err:?}");
    assert!(!scenario.journal.contains("process.run pave"));
}
