//! # Outbound Ports
//!
//! Contracts for everything the lifecycle asks of the outside world: the
//! discovery service, remote sessions on the device, and local subprocesses.
//!
//! ## Rules
//! 1. All items here are `traits` or the plain data they exchange.
//! 2. Concrete implementations live in [`crate::adapters`].
//! 3. Implementations report a failed query as [`TargetError::QueryFailed`] so
//!    that polling loops can tell it apart from terminal failures.
//!
//! [`TargetError::QueryFailed`]: devtarget_common::TargetError::QueryFailed

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use devtarget_common::Result;
use devtarget_common::network::target::{DiscoveredNode, Endpoint, TargetSelector};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Both streams, stdout first.
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// How a local subprocess ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Exited(CommandOutput),
    /// The process did not exit in time and was killed.
    TimedOut,
}

/// Local-network service that knows which devices are visible.
#[async_trait]
pub trait DiscoveryService: Send + Sync {
    /// Every device currently visible.
    async fn list_targets(&self) -> Result<Vec<DiscoveredNode>>;

    /// Resolves a node name to its SSH address.
    async fn ssh_address(&self, node_name: &str) -> Result<Endpoint>;

    /// Tells the service how to reach a device it does not know by name.
    ///
    /// The returned registration must be released exactly once.
    async fn add_target(&self, endpoint: &Endpoint) -> Result<Box<dyn Registration>>;

    /// Blocks until the target is attachable or `timeout` elapses.
    async fn wait_reachable(&self, target: &TargetSelector, timeout: Duration) -> Result<()>;
}

/// A temporary route registered with the discovery service.
///
/// Release is synchronous so that it can run from a destructor.
pub trait Registration: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    fn release(&mut self) -> Result<()>;
}

/// Opens control sessions to a device.
pub trait SessionFactory: Send + Sync {
    fn open(&self, endpoint: &Endpoint) -> Box<dyn RemoteSession>;
}

/// A control session on the device.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Runs a command on the device and waits for it to finish.
    async fn run(&self, command: &[&str], timeout: Option<Duration>) -> Result<CommandOutput>;

    /// Asks the transport to end the session gracefully.
    async fn terminate(&self) -> Result<()>;

    /// Releases local resources held by the session.
    fn close(&mut self) {}
}

/// Runs local subprocesses with a bounded lifetime.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, program: &Path, args: &[String], timeout: Duration) -> Result<ProcessOutcome>;
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
