//! Resolves a device identity to a reachable endpoint.
//!
//! A device that is still booting is an expected state, so failed queries come
//! back as [`DiscoveryResult::NotFound`]. More than one visible device without
//! a node name to pick one is fatal.

use std::sync::Arc;

use devtarget_common::network::target::{
    DiscoveredNode, DiscoveryResult, Endpoint, UNKNOWN_NODE_NAME,
};
use devtarget_common::{Result, TargetError, info};
use tracing::debug;

use crate::ports::DiscoveryService;

#[derive(Clone)]
pub struct NodeLocator {
    discovery: Arc<dyn DiscoveryService>,
}

impl NodeLocator {
    pub fn new(discovery: Arc<dyn DiscoveryService>) -> Self {
        Self { discovery }
    }

    /// Looks for `known_node_name`, or for the only visible device when unset.
    pub async fn discover(&self, known_node_name: Option<&str>) -> Result<DiscoveryResult> {
        let node_name: String = match known_node_name {
            Some(name) => name.to_string(),
            None => match self.single_visible_node().await? {
                Some(name) => name,
                None => return Ok(DiscoveryResult::NotFound),
            },
        };

        let endpoint: Endpoint = match self.discovery.ssh_address(&node_name).await {
            Ok(endpoint) => endpoint,
            Err(e) if e.is_transient() => {
                debug!("could not resolve {node_name}: {e}");
                return Ok(DiscoveryResult::NotFound);
            }
            Err(e) => return Err(e),
        };

        info!(
            "Found device \"{node_name}\" at {}:{}.",
            endpoint.host,
            endpoint.effective_port()
        );

        Ok(DiscoveryResult::Found {
            node_name,
            endpoint,
        })
    }

    /// Lists visible devices and returns the name of the only one, if any.
    ///
    /// A failed listing usually means the device sits in its recovery
    /// bootloader, which the caller may decide to repave.
    async fn single_visible_node(&self) -> Result<Option<String>> {
        let nodes: Vec<DiscoveredNode> = match self.discovery.list_targets().await {
            Ok(nodes) => nodes,
            Err(e) if e.is_transient() => {
                debug!("listing targets failed: {e}");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match nodes.as_slice() {
            [] => Ok(None),
            [only] => Ok(only.announced_name().map(str::to_string)),
            _ => Err(TargetError::DiscoveryAmbiguous {
                candidates: nodes
                    .iter()
                    .map(|node| node.announced_name().unwrap_or(UNKNOWN_NODE_NAME).to_string())
                    .collect(),
            }),
        }
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
