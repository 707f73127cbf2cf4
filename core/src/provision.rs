//! Paving a device and finding it again afterwards.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use devtarget_common::config::Timings;
use devtarget_common::network::target::{DiscoveryResult, TargetIdentity};
use devtarget_common::{Result, TargetError, info, success};
use tracing::{Instrument, debug, info_span};

use crate::connection::{ConnectionHandle, ConnectionManager};
use crate::locator::NodeLocator;
use crate::ports::{ProcessOutcome, ProcessRunner};

/// Paving script shipped in the system image directory.
pub const PAVE_SCRIPT: &str = "pave.sh";

const NODE_NAME_MARKER: &str = "Proceeding with nodename ";

/// Inputs of a single paving attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub image_dir: PathBuf,
    pub authorized_keys: PathBuf,
    /// Restricts paving to the device with this node name.
    pub node_name: Option<String>,
    pub timeout: Duration,
}

impl ProvisionRequest {
    pub fn program(&self) -> PathBuf {
        self.image_dir.join(PAVE_SCRIPT)
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec![
            "--authorized-keys".to_string(),
            self.authorized_keys.display().to_string(),
        ];
        if let Some(node_name) = &self.node_name {
            args.extend(["-n".to_string(), node_name.clone(), "-1".to_string()]);
        }
        args
    }
}

/// Finds the node name the paving tool reported for the freshly paved device.
pub fn parse_node_name(output: &str) -> Result<String> {
    output
        .lines()
        .filter_map(|line| {
            let (_, rest) = line.split_once(NODE_NAME_MARKER)?;
            let name = rest.trim().trim_matches('`').trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .next()
        .ok_or(TargetError::NodeNameParse)
}

#[derive(Clone)]
pub struct Provisioner {
    processes: Arc<dyn ProcessRunner>,
    locator: NodeLocator,
    connections: ConnectionManager,
    timings: Timings,
}

impl Provisioner {
    pub fn new(
        processes: Arc<dyn ProcessRunner>,
        locator: NodeLocator,
        connections: ConnectionManager,
        timings: Timings,
    ) -> Self {
        Self {
            processes,
            locator,
            connections,
            timings,
        }
    }

    /// Paves the device, waits for it to rejoin the network and connects to it.
    pub async fn provision(
        &self,
        request: &ProvisionRequest,
    ) -> Result<(TargetIdentity, ConnectionHandle)> {
        let node_name = self
            .pave(request)
            .instrument(info_span!("pave", indicatif.pb_show = true))
            .await?;
        info!("Booted device \"{node_name}\".");

        let identity = self
            .rediscover(&node_name)
            .instrument(info_span!("rediscover", indicatif.pb_show = true, node = %node_name))
            .await?;
        let connection = self.connections.connect(&identity).await?;

        Ok((identity, connection))
    }

    async fn pave(&self, request: &ProvisionRequest) -> Result<String> {
        let program = request.program();
        let args = request.args();
        info!("{} {}", program.display(), args.join(" "));

        let output = match self.processes.run(&program, &args, request.timeout).await? {
            ProcessOutcome::Exited(output) => output,
            ProcessOutcome::TimedOut => {
                return Err(TargetError::PaveTimedOut {
                    timeout_secs: request.timeout.as_secs(),
                });
            }
        };

        if !output.success() {
            debug!("paving output: {}", output.combined());
            return Err(TargetError::PaveFailed {
                exit_code: output.exit_code,
            });
        }

        parse_node_name(&output.stderr)
    }

    /// Polls discovery with a fixed budget until `node_name` shows up.
    async fn rediscover(&self, node_name: &str) -> Result<TargetIdentity> {
        info!("Waiting for device to join network.");
        let attempts = self.timings.boot_discovery_attempts;

        for attempt in 1..=attempts {
            if let DiscoveryResult::Found { node_name, endpoint } =
                self.locator.discover(Some(node_name)).await?
            {
                success!("Device \"{node_name}\" rejoined the network at {endpoint}.");
                return Ok(TargetIdentity::discovered(node_name, endpoint));
            }
            debug!("device {node_name} not visible yet ({attempt}/{attempts})");
            if attempt < attempts {
                tokio::time::sleep(self.timings.boot_discovery_delay).await;
            }
        }

        Err(TargetError::NotDiscoveredAfterProvision {
            node_name: node_name.to_string(),
            attempts,
        })
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
