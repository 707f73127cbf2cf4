use std::time::Duration;

use devtarget_common::config::{OsCheck, TargetConfig};
use devtarget_common::TargetError;
use devtarget_core::LifecycleState;

use super::support::{config, image_dir, Scenario};

fn direct(host: &str) -> TargetConfig {
    TargetConfig {
        host: Some(host.to_string()),
        ..TargetConfig::default()
    }
}

#[tokio::test]
async fn stop_terminates_then_releases_once() {
    let scenario = Scenario::lab_device("core", "20240101.1.1");
    let mut target = scenario.target(TargetConfig::default());
    target.start().await.unwrap();

    target.stop().await.unwrap();
    target.stop().await.unwrap();

    let journal = &scenario.journal;
    assert_eq!(journal.count("session.terminate"), 1);
    assert_eq!(journal.count("session.close"), 1);
    assert!(journal.position("session.terminate") < journal.position("session.close"));
    assert_eq!(target.state(), LifecycleState::Idle);
    assert!(!target.is_started());
}

#[tokio::test]
async fn failed_termination_still_releases_everything() {
    let scenario = Scenario::new();
    scenario.sessions.clone().failing_terminate();
    let mut target = scenario.target(direct("10.0.0.9"));
    target.start().await.unwrap();

    let err = target.stop().await.unwrap_err();

    assert!(matches!(err, TargetError::RemoteCommand { .. }), "{err:?}");
    assert_eq!(scenario.journal.count("discovery.remove 10.0.0.9"), 1);
    assert_eq!(scenario.journal.count("session.close"), 1);
    assert!(!target.is_started());
    assert_eq!(target.state(), LifecycleState::Idle);

    target.stop().await.unwrap();
    assert_eq!(scenario.journal.count("session.terminate"), 1);
}

#[tokio::test]
async fn stop_after_a_rejected_device_releases_it_once() {
    let scenario = Scenario::lab_device("core", "20231201.3.1");
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(config(OsCheck::Check, &images));
    let err = target.start().await.unwrap_err();
    assert!(matches!(err, TargetError::VersionMismatch { .. }), "{err:?}");

    target.stop().await.unwrap();
    target.stop().await.unwrap();
    drop(target);

    let journal = &scenario.journal;
    assert_eq!(journal.count("session.open"), 1);
    assert_eq!(journal.count("session.close"), 1);
    assert!(!journal.contains("session.terminate"));
}

#[tokio::test(start_paused = true)]
async fn stop_after_a_failed_direct_start_releases_the_context_once() {
    let scenario = Scenario::new();
    scenario.sessions.clone().unreachable_for(u32::MAX);
    let mut target = scenario.target(direct("10.0.0.9"));
    let err = target.start().await.unwrap_err();
    assert!(matches!(err, TargetError::SshUnreachable { .. }), "{err:?}");

    target.stop().await.unwrap();
    drop(target);

    assert_eq!(scenario.journal.count("discovery.remove 10.0.0.9"), 1);
    assert_eq!(scenario.journal.count("session.close"), 1);
    assert!(!scenario.journal.contains("session.terminate"));
}

#[tokio::test]
async fn target_context_is_released_before_the_session() {
    let scenario = Scenario::new();
    let mut target = scenario.target(direct("10.0.0.9"));
    target.start().await.unwrap();

    target.stop().await.unwrap();

    let journal = &scenario.journal;
    let removed = journal.position("discovery.remove 10.0.0.9").unwrap();
    let closed = journal.position("session.close").unwrap();
    assert!(removed < closed, "{:?}", journal.entries());
}

#[tokio::test]
async fn dropping_a_started_target_releases_it() {
    let scenario = Scenario::new();
    let mut target = scenario.target(direct("10.0.0.9"));
    target.start().await.unwrap();

    drop(target);

    assert_eq!(scenario.journal.count("discovery.remove 10.0.0.9"), 1);
    assert_eq!(scenario.journal.count("session.close"), 1);
    assert!(!scenario.journal.contains("session.terminate"));
}

#[tokio::test]
async fn failed_attach_leaves_nothing_registered() {
    let scenario = Scenario::new();
    scenario.discovery.clone().failing_wait();
    let mut target = scenario.target(direct("10.0.0.9"));

    let err = target.start().await.unwrap_err();

    assert!(matches!(err, TargetError::Connectivity(_)), "{err:?}");
    assert_eq!(scenario.journal.count("discovery.remove 10.0.0.9"), 1);
    assert!(!scenario.journal.contains("session.open"));
    target.stop().await.unwrap();
    assert_eq!(scenario.journal.count("discovery.remove"), 1);
}

#[tokio::test(start_paused = true)]
async fn restart_reconnects_through_discovery() {
    let scenario = Scenario::lab_device("core", "20240101.1.1");
    let mut target = scenario.target(TargetConfig::default());
    target.start().await.unwrap();
    let before_reboot = tokio::time::Instant::now();

    target.restart().await.unwrap();

    assert!(before_reboot.elapsed() >= Duration::from_secs(20));
    let journal = &scenario.journal;
    assert_eq!(journal.count("session.run dm reboot"), 1);
    assert_eq!(journal.count("session.open"), 2);
    assert_eq!(journal.count("discovery.list"), 1);
    assert_eq!(journal.count("discovery.resolve lab-1"), 2);
    assert_eq!(target.state(), LifecycleState::Connected);

    target.stop().await.unwrap();
    assert_eq!(journal.count("session.close"), 2);
}
