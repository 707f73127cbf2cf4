use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use devtarget_common::config::{OsCheck, TargetConfig};
use devtarget_common::network::target::{DiscoveredNode, Endpoint};
use devtarget_core::testing::{FakeDiscovery, FakeProcesses, FakeSessions, Journal};
use devtarget_core::version::{BUILD_ARGS_FILE, ON_DEVICE_PRODUCT_FILE, ON_DEVICE_VERSION_FILE};
use devtarget_core::{DeviceTarget, Services};
use tempfile::TempDir;

pub const AUTHORIZED_KEYS: &str = "/home/dev/.ssh/fuchsia_authorized_keys";

pub const PAVE_STDERR: &str = "\
[bootserver] Sending zedboot image...
[bootserver] Proceeding with nodename my-device-1234
[bootserver] Transfer ends successfully.
";

/// A simulated network with one development host and its collaborators.
pub struct Scenario {
    pub journal: Journal,
    pub discovery: FakeDiscovery,
    pub sessions: FakeSessions,
    pub processes: FakeProcesses,
}

impl Scenario {
    pub fn new() -> Self {
        let journal = Journal::default();
        Self {
            discovery: FakeDiscovery::new(journal.clone()),
            sessions: FakeSessions::new(journal.clone()),
            processes: FakeProcesses::new(journal.clone()),
            journal,
        }
    }

    /// A single device `lab-1` at 10.0.0.5 running `product@version`.
    pub fn lab_device(product: &str, version: &str) -> Self {
        let scenario = Self::new();
        scenario
            .discovery
            .clone()
            .with_listing(vec![DiscoveredNode::named("lab-1")])
            .with_address("lab-1", Endpoint::new("10.0.0.5", None));
        scenario.runs(product, version);
        scenario
    }

    pub fn runs(&self, product: &str, version: &str) {
        self.sessions
            .clone()
            .with_file(ON_DEVICE_PRODUCT_FILE, &format!("{product}\n"))
            .with_file(ON_DEVICE_VERSION_FILE, &format!("{version}\n"));
    }

    /// Paving succeeds and the device comes back as `my-device-1234` at
    /// 10.0.0.77 after `failures` unsuccessful lookups.
    pub fn paving_succeeds(&self, failures: u32) {
        self.processes.clone().exiting("pave.sh", 0, "", PAVE_STDERR);
        self.discovery
            .clone()
            .with_address("my-device-1234", Endpoint::new("10.0.0.77", None))
            .hidden_until_paved("my-device-1234", failures);
    }

    pub fn target(&self, config: TargetConfig) -> DeviceTarget {
        DeviceTarget::new(
            config,
            Services {
                discovery: Arc::new(self.discovery.clone()),
                sessions: Arc::new(self.sessions.clone()),
                processes: Arc::new(self.processes.clone()),
                sdk: None,
            },
        )
        .unwrap()
    }
}

/// An image directory whose `buildargs.gn` announces `product@version`.
pub fn image_dir(product: &str, version: &str) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join(BUILD_ARGS_FILE),
        format!(
            "build_info_board = \"x64\"\nbuild_info_product = \"{product}\"\nbuild_info_version = \"{version}\"\n"
        ),
    )
    .unwrap();
    dir
}

pub fn config(os_check: OsCheck, images: &TempDir) -> TargetConfig {
    TargetConfig {
        os_check,
        system_image_dir: Some(images.path().to_path_buf()),
        authorized_keys: Some(PathBuf::from(AUTHORIZED_KEYS)),
        ..TargetConfig::default()
    }
}
