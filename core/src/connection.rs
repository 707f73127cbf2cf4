//! Control session lifecycle.
//!
//! A [`ConnectionHandle`] owns everything a live session holds on to: the
//! optional [`ScopedTargetContext`] registered with the discovery service and
//! the remote session itself. Both are released exactly once, context first,
//! either by [`ConnectionHandle::disconnect`] or when the handle is dropped.

use std::sync::Arc;
use std::time::Duration;

use devtarget_common::config::Timings;
use devtarget_common::network::target::{Endpoint, TargetIdentity, TargetSelector};
use devtarget_common::{Result, TargetError, error, info, success, warn};
use tokio::time::Instant;
use tracing::{debug, info_span, Instrument};

use crate::ports::{CommandOutput, DiscoveryService, Registration, RemoteSession, SessionFactory};

/// Timeout applied to commands issued through a handle.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout of a single reachability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// A temporary registration telling the discovery service how to reach an
/// address it does not know by node name.
pub struct ScopedTargetContext {
    registration: Option<Box<dyn Registration>>,
}

impl ScopedTargetContext {
    pub async fn enter(discovery: &dyn DiscoveryService, endpoint: &Endpoint) -> Result<Self> {
        let registration = discovery.add_target(endpoint).await?;
        debug!("registered {endpoint} with the discovery service");
        Ok(Self {
            registration: Some(registration),
        })
    }

    pub fn is_active(&self) -> bool {
        self.registration.is_some()
    }

    /// Releases the registration. Later calls do nothing.
    pub fn exit(&mut self) {
        if let Some(mut registration) = self.registration.take() {
            if let Err(e) = registration.release() {
                warn!("Could not remove {} from the discovery service: {e}", registration.endpoint());
            }
        }
    }
}

impl Drop for ScopedTargetContext {
    fn drop(&mut self) {
        self.exit();
    }
}

/// An exclusively owned, live control session.
pub struct ConnectionHandle {
    selector: TargetSelector,
    endpoint: Endpoint,
    context: Option<ScopedTargetContext>,
    session: Option<Box<dyn RemoteSession>>,
}

impl ConnectionHandle {
    pub fn selector(&self) -> &TargetSelector {
        &self.selector
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    pub fn has_target_context(&self) -> bool {
        self.context.as_ref().is_some_and(ScopedTargetContext::is_active)
    }

    fn session(&self) -> Result<&dyn RemoteSession> {
        self.session
            .as_deref()
            .ok_or_else(|| TargetError::Connectivity(format!("not connected to {}", self.selector)))
    }

    /// Runs a command on the device and returns its output, whatever the exit code.
    pub async fn run_command(&self, command: &[&str]) -> Result<CommandOutput> {
        debug!("running '{}'", command.join(" "));
        self.session()?.run(command, Some(COMMAND_TIMEOUT)).await
    }

    /// Runs a command whose failure is expected because it takes the
    /// connection down with it, such as a reboot.
    pub async fn run_detached(&self, command: &[&str], timeout: Duration) {
        let joined = command.join(" ");
        match self.session() {
            Ok(session) => match session.run(command, Some(timeout)).await {
                Ok(output) if output.success() => debug!("'{joined}' completed"),
                Ok(output) => debug!("'{joined}' exited with {:?}", output.exit_code),
                Err(e) => warn!("'{joined}' could not be issued: {e}"),
            },
            Err(e) => warn!("'{joined}' could not be issued: {e}"),
        }
    }

    /// Reads a file on the device.
    pub async fn read_file(&self, path: &str) -> Result<String> {
        let output = self.run_command(&["cat", path]).await?;
        if !output.success() {
            return Err(TargetError::Connectivity(format!(
                "could not read file {path} on device: {}",
                output.combined().trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Ends the session on the transport side.
    pub async fn terminate(&self) -> Result<()> {
        self.session()?.terminate().await
    }

    /// Releases the target context, then the session. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(mut context) = self.context.take() {
            context.exit();
        }
        if let Some(mut session) = self.session.take() {
            session.close();
            debug!("disconnected from {}", self.selector);
        }
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Opens and probes control sessions.
#[derive(Clone)]
pub struct ConnectionManager {
    discovery: Arc<dyn DiscoveryService>,
    sessions: Arc<dyn SessionFactory>,
    timings: Timings,
}

impl ConnectionManager {
    pub fn new(
        discovery: Arc<dyn DiscoveryService>,
        sessions: Arc<dyn SessionFactory>,
        timings: Timings,
    ) -> Self {
        Self {
            discovery,
            sessions,
            timings,
        }
    }

    /// Binds a session to the identity and waits until the device answers.
    ///
    /// With a node name the discovery service is assumed to know the route.
    /// Otherwise the address is registered through a scoped target context,
    /// which is released again if anything below fails.
    pub async fn connect(&self, identity: &TargetIdentity) -> Result<ConnectionHandle> {
        let endpoint: Endpoint = self.resolve_endpoint(identity).await?;
        info!("Connecting to device {identity}.");

        let (selector, context) = match &identity.node_name {
            Some(name) => (TargetSelector::Node(name.clone()), None),
            None => {
                let context = ScopedTargetContext::enter(self.discovery.as_ref(), &endpoint).await?;
                let selector = TargetSelector::Address(endpoint.clone());
                self.discovery
                    .wait_reachable(&selector, self.timings.attach_timeout)
                    .await
                    .map_err(|e| {
                        TargetError::Connectivity(format!("{selector} did not become attachable: {e}"))
                    })?;
                (selector, Some(context))
            }
        };

        let session = self
            .await_ssh(&endpoint)
            .instrument(info_span!("attach", indicatif.pb_show = true, device = %selector))
            .await?;
        success!("Connected!");

        Ok(ConnectionHandle {
            selector,
            endpoint,
            context,
            session: Some(session),
        })
    }

    async fn resolve_endpoint(&self, identity: &TargetIdentity) -> Result<Endpoint> {
        if let Some(endpoint) = identity.endpoint() {
            return Ok(endpoint);
        }
        match &identity.node_name {
            Some(name) => self.discovery.ssh_address(name).await,
            None => Err(TargetError::Configuration(
                "neither a host nor a node name is known for the device".to_string(),
            )),
        }
    }

    /// Probes the endpoint with a no-op command until it succeeds or the
    /// attach timeout elapses.
    async fn await_ssh(&self, endpoint: &Endpoint) -> Result<Box<dyn RemoteSession>> {
        let mut session: Box<dyn RemoteSession> = self.sessions.open(endpoint);
        let interval = self.timings.attach_retry_interval;
        let deadline = Instant::now() + self.timings.attach_timeout;

        loop {
            let probe = session.run(&["true"], Some(PROBE_TIMEOUT)).await?;
            if probe.success() {
                return Ok(session);
            }
            debug!("{endpoint} not reachable yet (exit code {:?})", probe.exit_code);

            if Instant::now() + interval >= deadline {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        session.close();
        error!("Timeout limit reached.");
        Err(TargetError::SshUnreachable {
            endpoint: endpoint.clone(),
            timeout_secs: self.timings.attach_timeout.as_secs(),
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
