use std::fs;

use devtarget_common::config::OsCheck;
use devtarget_common::version::VersionInfo;
use devtarget_common::TargetError;
use devtarget_core::version::{BUILD_ARGS_FILE, ON_DEVICE_VERSION_FILE};
use devtarget_core::LifecycleState;

use super::support::{config, image_dir, Scenario};

#[tokio::test]
async fn ignore_never_compares_versions() {
    let scenario = Scenario::lab_device("workstation", "0.0.1");
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(config(OsCheck::Ignore, &images));

    target.start().await.unwrap();

    assert_eq!(target.state(), LifecycleState::Connected);
    assert!(!scenario.journal.contains("session.run cat"));
    assert!(!scenario.journal.contains("process.run"));
}

#[tokio::test]
async fn matching_version_is_left_alone() {
    let scenario = Scenario::lab_device("core", "20240101.1.1");
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(config(OsCheck::Update, &images));

    target.start().await.unwrap();

    assert_eq!(target.state(), LifecycleState::Connected);
    assert_eq!(scenario.journal.count("session.run cat"), 2);
    assert!(!scenario.journal.contains("process.run"));
    assert!(!scenario.journal.contains("session.run dm"));
    assert_eq!(target.identity().node_name.as_deref(), Some("lab-1"));
}

#[tokio::test]
async fn check_reports_a_mismatch_without_paving() {
    let scenario = Scenario::lab_device("core", "20231201.3.1");
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(config(OsCheck::Check, &images));

    let err = target.start().await.unwrap_err();

    match &err {
        TargetError::VersionMismatch { expected, installed } => {
            assert_eq!(expected, &VersionInfo::new("core", "20240101.1.1"));
            assert_eq!(installed, &VersionInfo::new("core", "20231201.3.1"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("--os-check update"), "{err}");
    assert!(!scenario.journal.contains("process.run"));
    assert!(!scenario.journal.contains("session.run dm"));
    assert_eq!(target.state(), LifecycleState::Mismatched);
}

#[tokio::test]
async fn mismatch_is_reported_again_on_the_next_start() {
    let scenario = Scenario::lab_device("core", "20231201.3.1");
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(config(OsCheck::Check, &images));

    let first = target.start().await.unwrap_err();
    assert!(matches!(first, TargetError::VersionMismatch { .. }), "{first:?}");
    assert!(!target.is_started());
    assert!(target.connection().is_none());
    assert_eq!(scenario.journal.count("session.close"), 1);

    let second = target.start().await.unwrap_err();

    assert!(matches!(second, TargetError::VersionMismatch { .. }), "{second:?}");
    assert!(!target.is_started());
    assert_eq!(target.state(), LifecycleState::Mismatched);
    assert_eq!(scenario.journal.count("session.open"), 2);
    assert_eq!(scenario.journal.count("session.close"), 2);
    assert!(matches!(target.run_command(&["true"]).await, Err(TargetError::Connectivity(_))));
}

#[tokio::test]
async fn same_version_of_another_product_is_a_mismatch() {
    let scenario = Scenario::lab_device("workstation", "20240101.1.1");
    let images = image_dir("core", "20240101.1.1");

    let err = scenario
        .target(config(OsCheck::Check, &images))
        .start()
        .await
        .unwrap_err();

    assert!(matches!(err, TargetError::VersionMismatch { .. }), "{err:?}");
}

#[tokio::test(start_paused = true)]
async fn update_repaves_exactly_once() {
    let scenario = Scenario::lab_device("core", "20231201.3.1");
    scenario.paving_succeeds(2);
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(config(OsCheck::Update, &images));

    target.start().await.unwrap();

    let journal = &scenario.journal;
    assert_eq!(journal.count("process.run pave"), 1);
    assert!(journal.contains("process.run pave --authorized-keys /home/dev/.ssh/fuchsia_authorized_keys -n lab-1 -1"));
    assert_eq!(journal.count("discovery.resolve my-device-1234"), 3);

    let recovery = journal.position("session.run dm reboot-recovery").unwrap();
    let released = journal.position("session.close").unwrap();
    let paved = journal.position("process.run pave").unwrap();
    let rediscovered = journal.position("discovery.resolve my-device-1234").unwrap();
    assert!(recovery < released && released < paved && paved < rediscovered);

    assert_eq!(target.state(), LifecycleState::Connected);
    assert!(target.is_started());
    assert_eq!(target.identity().node_name.as_deref(), Some("my-device-1234"));
    assert_eq!(target.identity().host.as_deref(), Some("10.0.0.77"));
}

#[tokio::test]
async fn malformed_build_args_are_fatal() {
    let scenario = Scenario::lab_device("core", "20240101.1.1");
    let images = image_dir("core", "20240101.1.1");
    fs::write(images.path().join(BUILD_ARGS_FILE), "build_info_product = \"core\"\n").unwrap();

    let err = scenario
        .target(config(OsCheck::Update, &images))
        .start()
        .await
        .unwrap_err();

    match err {
        TargetError::VersionParse { artifact, contents, .. } => {
            assert_eq!(artifact, images.path().join(BUILD_ARGS_FILE));
            assert!(contents.contains("build_info_product"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(!scenario.journal.contains("process.run"));
}

#[tokio::test]
async fn unreadable_device_file_is_not_a_mismatch() {
    let scenario = Scenario::lab_device("core", "20240101.1.1");
    scenario.sessions.clone().failing_command(&format!("cat {ON_DEVICE_VERSION_FILE}"));
    let images = image_dir("core", "20240101.1.1");

    let err = scenario
        .target(config(OsCheck::Update, &images))
        .start()
        .await
        .unwrap_err();

    assert!(matches!(err, TargetError::Connectivity(_)), "{err:?}");
    assert!(!scenario.journal.contains("process.run"));
}
