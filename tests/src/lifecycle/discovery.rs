use devtarget_common::config::{OsCheck, TargetConfig};
use devtarget_common::network::target::{DiscoveredNode, Endpoint, UNKNOWN_NODE_NAME};
use devtarget_common::TargetError;
use devtarget_core::LifecycleState;

use super::support::{config, image_dir, Scenario};

#[tokio::test]
async fn several_visible_devices_are_never_auto_picked() {
    let scenario = Scenario::new();
    scenario.discovery.clone().with_listing(vec![
        DiscoveredNode::named("lab-1"),
        DiscoveredNode::named("lab-2"),
        DiscoveredNode::named("lab-3"),
    ]);
    let mut target = scenario.target(TargetConfig::default());

    let err = target.start().await.unwrap_err();

    match &err {
        TargetError::DiscoveryAmbiguous { candidates } => {
            assert_eq!(candidates, &["lab-1", "lab-2", "lab-3"]);
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(err.to_string().contains("--node-name"), "{err}");
    assert!(!err.is_transient());
    assert!(!scenario.journal.contains("session.open"));
    assert!(!scenario.journal.contains("discovery.resolve"));
    assert_eq!(target.state(), LifecycleState::Idle);
}

#[tokio::test]
async fn ambiguity_is_fatal_even_under_update() {
    let scenario = Scenario::new();
    scenario
        .discovery
        .clone()
        .with_listing(vec![DiscoveredNode::named("lab-1"), DiscoveredNode::named("lab-2")]);
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(config(OsCheck::Update, &images));

    let err = target.start().await.unwrap_err();

    assert!(matches!(err, TargetError::DiscoveryAmbiguous { .. }), "{err:?}");
    assert!(!scenario.journal.contains("process.run"));
}

#[tokio::test]
async fn unannounced_device_behaves_like_an_empty_network() {
    let empty = Scenario::new();
    let empty_err = empty.target(TargetConfig::default()).start().await.unwrap_err();

    for announced in [UNKNOWN_NODE_NAME, ""] {
        let scenario = Scenario::new();
        scenario
            .discovery
            .clone()
            .with_listing(vec![DiscoveredNode::named(announced)])
            .with_address(announced, Endpoint::new("10.0.0.5", None));

        let err = scenario.target(TargetConfig::default()).start().await.unwrap_err();

        assert!(matches!(err, TargetError::DeviceNotFound { node_name: None }), "{err:?}");
        assert_eq!(err.to_string(), empty_err.to_string());
        assert!(!scenario.journal.contains("discovery.resolve"));
        assert!(!scenario.journal.contains("session.open"));
    }
}

#[tokio::test]
async fn failing_listing_degrades_to_not_found() {
    let scenario = Scenario::new();
    scenario
        .discovery
        .clone()
        .queue_listing(Err(TargetError::QueryFailed("ffx daemon is not running".into())));

    let err = scenario.target(TargetConfig::default()).start().await.unwrap_err();

    assert!(matches!(err, TargetError::DeviceNotFound { node_name: None }), "{err:?}");
}

#[tokio::test]
async fn explicit_host_connects_directly_without_policy() {
    let scenario = Scenario::lab_device("workstation", "1.0");
    let images = image_dir("core", "20240101.1.1");
    let mut target = scenario.target(TargetConfig {
        host: Some("10.0.0.9".into()),
        port: Some(8022),
        ..config(OsCheck::Check, &images)
    });

    target.start().await.unwrap();

    assert_eq!(target.state(), LifecycleState::ConnectedDirect);
    assert!(target.connection().unwrap().has_target_context());
    assert_eq!(
        scenario.journal.entries(),
        vec![
            "discovery.add 10.0.0.9:8022",
            "discovery.wait 10.0.0.9:8022 120s",
            "session.open 10.0.0.9:8022",
            "session.run true",
        ]
    );
}

#[tokio::test]
async fn standard_port_is_left_to_the_transport() {
    let scenario = Scenario::new();
    let mut target = scenario.target(TargetConfig {
        host: Some("10.0.0.9".into()),
        port: Some(22),
        ..TargetConfig::default()
    });

    target.start().await.unwrap();

    assert_eq!(target.identity().port, None);
    assert!(scenario.journal.contains("discovery.add 10.0.0.9"));
    assert!(!scenario.journal.contains("discovery.add 10.0.0.9:22"));
}

#[tokio::test]
async fn known_node_name_skips_the_listing() {
    let scenario = Scenario::lab_device("core", "20240101.1.1");
    let mut target = scenario.target(TargetConfig {
        node_name: Some("lab-1".into()),
        ..TargetConfig::default()
    });

    target.start().await.unwrap();

    assert!(!scenario.journal.contains("discovery.list"));
    assert!(!scenario.journal.contains("discovery.add"));
    assert_eq!(target.identity().host.as_deref(), Some("10.0.0.5"));
}
