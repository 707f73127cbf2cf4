//! # Device target lifecycle
//!
//! [`DeviceTarget`] owns the identity of the single device being managed and
//! the one live [`ConnectionHandle`] to it. `start` sequences discovery,
//! connection, version enforcement and repaving; `stop` tears everything down
//! on every path.
//!
//! ```text
//! Idle ─► Locating ─► Connected ─► VersionChecking ─► Connected
//!   │                                   │
//!   │                                   └─► Mismatched ─► Provisioning ─► Connected
//!   └─► ConnectedDirect
//! ```

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use devtarget_common::config::{OsCheck, PackageRepoSource, TargetConfig, expand_home};
use devtarget_common::network::target::{DiscoveryResult, TargetIdentity};
use devtarget_common::{Result, TargetError, info, success, warn};
use tracing::debug;

use crate::connection::{ConnectionHandle, ConnectionManager};
use crate::locator::NodeLocator;
use crate::ports::{CommandOutput, DiscoveryService, ProcessRunner, SessionFactory};
use crate::provision::{ProvisionRequest, Provisioner};
use crate::sdk::{AUTH_KEYS_FUNCTION, GnSdk};
use crate::version::{BUILD_ARGS_FILE, expected_version, installed_version};

const REBOOT_COMMAND: [&str; 2] = ["dm", "reboot"];
const RECOVERY_COMMAND: [&str; 2] = ["dm", "reboot-recovery"];

/// Upper bound for a reboot command, which usually drops the session.
const REBOOT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// External collaborators of a device target.
#[derive(Clone)]
pub struct Services {
    pub discovery: Arc<dyn DiscoveryService>,
    pub sessions: Arc<dyn SessionFactory>,
    pub processes: Arc<dyn ProcessRunner>,
    /// Needed only when authorized keys have to be looked up for paving.
    pub sdk: Option<GnSdk>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Locating,
    Connected,
    /// Connected to an operator-pinned address. No version policy applies.
    ConnectedDirect,
    VersionChecking,
    Mismatched,
    Provisioning,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Locating => "locating",
            LifecycleState::Connected => "connected",
            LifecycleState::ConnectedDirect => "connected (direct)",
            LifecycleState::VersionChecking => "checking version",
            LifecycleState::Mismatched => "version mismatch",
            LifecycleState::Provisioning => "provisioning",
        };
        f.write_str(s)
    }
}

pub struct DeviceTarget {
    config: TargetConfig,
    os_check: OsCheck,
    package_repo: PackageRepoSource,
    identity: TargetIdentity,
    state: LifecycleState,
    connection: Option<ConnectionHandle>,
    locator: NodeLocator,
    connections: ConnectionManager,
    provisioner: Provisioner,
    sdk: Option<GnSdk>,
}

impl DeviceTarget {
    /// Validates the configuration and wires the lifecycle services.
    pub fn new(config: TargetConfig, services: Services) -> Result<Self> {
        config.validate()?;

        let os_check = config.effective_os_check();
        let package_repo = config.package_repo_source();
        let timings = config.timings;

        let locator = NodeLocator::new(services.discovery.clone());
        let connections = ConnectionManager::new(services.discovery, services.sessions, timings);
        let provisioner = Provisioner::new(
            services.processes,
            locator.clone(),
            connections.clone(),
            timings,
        );
        let identity = TargetIdentity::new(config.node_name.clone(), config.host.clone(), config.port);
        debug!("device target {identity} with os check policy {os_check}");

        Ok(Self {
            config,
            os_check,
            package_repo,
            identity,
            state: LifecycleState::Idle,
            connection: None,
            locator,
            connections,
            provisioner,
            sdk: services.sdk,
        })
    }

    pub fn identity(&self) -> &TargetIdentity {
        &self.identity
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn os_check(&self) -> OsCheck {
        self.os_check
    }

    pub fn package_repo(&self) -> &PackageRepoSource {
        &self.package_repo
    }

    pub fn is_started(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(ConnectionHandle::is_connected)
    }

    pub fn connection(&self) -> Option<&ConnectionHandle> {
        self.connection.as_ref()
    }

    pub async fn run_command(&self, command: &[&str]) -> Result<CommandOutput> {
        self.started()?.run_command(command).await
    }

    fn started(&self) -> Result<&ConnectionHandle> {
        self.connection
            .as_ref()
            .filter(|connection| connection.is_connected())
            .ok_or_else(|| TargetError::Connectivity("device target is not started".to_string()))
    }

    /// Brings the device up and connects to it.
    ///
    /// Does nothing when a connection is already live. A failed start never
    /// leaves a connection behind, so calling it again repeats every check.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_started() {
            debug!("device target already started");
            return Ok(());
        }

        let result = self.bring_up().await;
        if result.is_err() {
            self.disconnect();
            if self.state != LifecycleState::Mismatched {
                self.state = LifecycleState::Idle;
            }
        }
        result
    }

    async fn bring_up(&mut self) -> Result<()> {
        if let Some(host) = &self.config.host {
            let identity = TargetIdentity::new(None, Some(host.clone()), self.config.port);
            let connection = self.connections.connect(&identity).await?;
            self.identity = identity;
            self.connection = Some(connection);
            self.state = LifecycleState::ConnectedDirect;
            return Ok(());
        }

        self.state = LifecycleState::Locating;
        let known_node_name = self.identity.node_name.clone();

        match self.locator.discover(known_node_name.as_deref()).await? {
            DiscoveryResult::Found {
                node_name,
                endpoint,
            } => {
                self.identity = TargetIdentity::discovered(node_name, endpoint);
                let connection = self.connections.connect(&self.identity).await?;
                self.connection = Some(connection);
                self.state = LifecycleState::Connected;
                self.enforce_version().await
            }
            DiscoveryResult::NotFound => {
                if let Some(name) = &known_node_name {
                    info!("Could not detect device \"{name}\".");
                    if self.os_check == OsCheck::Update {
                        info!("Assuming it is in zedboot. Continuing with paving...");
                        return self.provision(known_node_name.clone()).await;
                    }
                }
                Err(TargetError::DeviceNotFound {
                    node_name: known_node_name,
                })
            }
        }
    }

    async fn enforce_version(&mut self) -> Result<()> {
        if self.os_check == OsCheck::Ignore {
            return Ok(());
        }

        self.state = LifecycleState::VersionChecking;
        let artifact = self.image_dir()?.join(BUILD_ARGS_FILE);
        let expected = expected_version(&artifact).await?;
        let installed = installed_version(self.started()?).await?;

        if expected.matches(&installed) {
            success!("Installed version {installed} matches the system image.");
            self.state = LifecycleState::Connected;
            return Ok(());
        }

        self.state = LifecycleState::Mismatched;
        if self.os_check == OsCheck::Check {
            return Err(TargetError::VersionMismatch { expected, installed });
        }

        info!("Installed version {installed} differs from {expected}.");
        info!("Putting device in recovery mode.");
        self.started()?
            .run_detached(&RECOVERY_COMMAND, REBOOT_COMMAND_TIMEOUT)
            .await;

        self.provision(self.identity.node_name.clone()).await
    }

    async fn provision(&mut self, node_name: Option<String>) -> Result<()> {
        self.disconnect();
        self.state = LifecycleState::Provisioning;

        let request = ProvisionRequest {
            image_dir: self.image_dir()?,
            authorized_keys: self.authorized_keys().await?,
            node_name,
            timeout: self.config.timings.pave_timeout,
        };
        let (identity, connection) = self.provisioner.provision(&request).await?;

        self.identity = identity;
        self.connection = Some(connection);
        self.state = LifecycleState::Connected;
        Ok(())
    }

    fn image_dir(&self) -> Result<PathBuf> {
        self.config
            .system_image_dir
            .as_deref()
            .map(expand_home)
            .ok_or_else(|| {
                TargetError::Configuration(
                    "image directory must be provided if a repave is needed (--system-image-dir)"
                        .to_string(),
                )
            })
    }

    async fn authorized_keys(&self) -> Result<PathBuf> {
        if let Some(path) = &self.config.authorized_keys {
            return Ok(expand_home(path));
        }
        match &self.sdk {
            Some(sdk) => sdk.path(AUTH_KEYS_FUNCTION).await,
            None => Err(TargetError::Configuration(
                "authorized keys are needed for paving; pass --authorized-keys or --sdk-script"
                    .to_string(),
            )),
        }
    }

    /// Reboots the device and starts it again once it had time to go down.
    pub async fn restart(&mut self) -> Result<()> {
        info!("Rebooting device {}.", self.identity);
        self.started()?
            .run_detached(&REBOOT_COMMAND, REBOOT_COMMAND_TIMEOUT)
            .await;
        self.disconnect();
        self.state = LifecycleState::Idle;

        tokio::time::sleep(self.config.timings.reboot_settle).await;
        self.start().await
    }

    /// Ends the session and releases the connection.
    ///
    /// The connection is always released, even when ending the session fails.
    pub async fn stop(&mut self) -> Result<()> {
        let terminated = match self.started() {
            Ok(connection) => connection.terminate().await,
            Err(_) => Ok(()),
        };
        if let Err(e) = &terminated {
            warn!("Could not end the session with {}: {e}", self.identity);
        }

        self.disconnect();
        self.state = LifecycleState::Idle;
        terminated
    }

    fn disconnect(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.disconnect();
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
