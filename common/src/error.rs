//! Error taxonomy for the device target lifecycle.
//!
//! Only [`TargetError::QueryFailed`] is transient: polling loops absorb it and
//! try again. Every other variant terminates the current `start`, `restart` or
//! `stop` call.

use std::path::PathBuf;

use thiserror::Error;

use crate::network::target::Endpoint;
use crate::version::VersionInfo;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "more than one device was discovered on the network. \
         Use --node-name <name> to specify the device to use. List of devices: {}",
        .candidates.join(", ")
    )]
    DiscoveryAmbiguous { candidates: Vec<String> },

    #[error("discovery query failed: {0}")]
    QueryFailed(String),

    #[error(
        "could not find device{}. If the device is connected to the host remotely, \
         make sure that --host flag is set and that remote serving is set up",
        .node_name.as_deref().map(|n| format!(" {n}")).unwrap_or_default()
    )]
    DeviceNotFound { node_name: Option<String> },

    #[error("could not extract version info from {}: {reason}. Contents: {contents:?}", .artifact.display())]
    VersionParse {
        artifact: PathBuf,
        contents: String,
        reason: String,
    },

    #[error(
        "image version {expected} does not match the version installed on device {installed}. \
         Use --os-check update to repave the device, or --os-check ignore to skip the check"
    )]
    VersionMismatch {
        expected: VersionInfo,
        installed: VersionInfo,
    },

    #[error("could not pave device (exit code {})", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".into()))]
    PaveFailed { exit_code: Option<i32> },

    #[error("could not pave device: paving did not finish within {timeout_secs}s")]
    PaveTimedOut { timeout_secs: u64 },

    #[error("could not parse nodename from paving output")]
    NodeNameParse,

    #[error("device {node_name} could not be discovered after provisioning ({attempts} attempts)")]
    NotDiscoveredAfterProvision { node_name: String, attempts: u32 },

    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("couldn't connect to {endpoint} using SSH within {timeout_secs}s")]
    SshUnreachable { endpoint: Endpoint, timeout_secs: u64 },

    #[error("remote command `{command}` failed with exit code {exit_code:?}: {output}")]
    RemoteCommand {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TargetError {
    /// Whether a polling loop may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::QueryFailed(_))
    }
}

pub type Result<T> = std::result::Result<T, TargetError>;
