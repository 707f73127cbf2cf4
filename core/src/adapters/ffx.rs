//! Discovery service backed by the `ffx` host tool.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use devtarget_common::network::target::{DiscoveredNode, Endpoint, TargetSelector};
use devtarget_common::{Result, TargetError};
use serde::Deserialize;
use tracing::debug;

use crate::ports::{
    CommandOutput, DiscoveryService, ProcessOutcome, ProcessRunner, Registration,
};

/// Upper bound for a single `ffx` query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra time granted to `ffx target wait` on top of its own timeout.
const WAIT_GRACE: Duration = Duration::from_secs(5);

/// One entry of `ffx --machine json target list`.
#[derive(Debug, Deserialize)]
struct FfxTargetEntry {
    #[serde(default)]
    nodename: Option<String>,
}

pub struct FfxDiscovery {
    ffx: PathBuf,
    processes: Arc<dyn ProcessRunner>,
}

impl FfxDiscovery {
    pub fn new(ffx: impl Into<PathBuf>, processes: Arc<dyn ProcessRunner>) -> Self {
        Self {
            ffx: ffx.into(),
            processes,
        }
    }

    async fn query(&self, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let description = format!("ffx {}", args.join(" "));
        debug!("{description}");

        match self.processes.run(&self.ffx, &args, timeout).await? {
            ProcessOutcome::Exited(output) if output.success() => Ok(output),
            ProcessOutcome::Exited(output) => Err(TargetError::QueryFailed(format!(
                "'{description}' exited with {:?}: {}",
                output.exit_code,
                output.combined().trim()
            ))),
            ProcessOutcome::TimedOut => Err(TargetError::QueryFailed(format!(
                "'{description}' timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }
}

/// Parses the JSON target listing. Empty output means no targets.
pub fn parse_target_list(stdout: &str) -> Result<Vec<DiscoveredNode>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<FfxTargetEntry> = serde_json::from_str(stdout)
        .map_err(|e| TargetError::QueryFailed(format!("unexpected target list: {e}")))?;
    Ok(entries
        .into_iter()
        .map(|entry| DiscoveredNode {
            nodename: entry.nodename,
        })
        .collect())
}

#[async_trait]
impl DiscoveryService for FfxDiscovery {
    async fn list_targets(&self) -> Result<Vec<DiscoveredNode>> {
        let output = self
            .query(&["--machine", "json", "target", "list"], QUERY_TIMEOUT)
            .await?;
        parse_target_list(&output.stdout)
    }

    async fn ssh_address(&self, node_name: &str) -> Result<Endpoint> {
        let output = self
            .query(&["-t", node_name, "target", "get-ssh-address"], QUERY_TIMEOUT)
            .await?;
        output
            .stdout
            .trim()
            .parse::<Endpoint>()
            .map_err(|e| TargetError::QueryFailed(format!("bad address for {node_name}: {e}")))
    }

    async fn add_target(&self, endpoint: &Endpoint) -> Result<Box<dyn Registration>> {
        let address = endpoint.to_string();
        self.query(&["target", "add", &address], QUERY_TIMEOUT).await?;
        Ok(Box::new(FfxRegistration {
            ffx: self.ffx.clone(),
            endpoint: endpoint.clone(),
            remove_timeout: REMOVE_TIMEOUT,
        }))
    }

    async fn wait_reachable(&self, target: &TargetSelector, timeout: Duration) -> Result<()> {
        let target = target.to_string();
        let secs = timeout.as_secs().to_string();
        self.query(&["-t", &target, "target", "wait", "-t", &secs], timeout + WAIT_GRACE)
            .await?;
        Ok(())
    }
}

/// Upper bound for `ffx target remove`, which runs from a destructor.
const REMOVE_TIMEOUT: Duration = Duration::from_secs(10);

const REMOVE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// An address added with `ffx target add`, removed again on release.
struct FfxRegistration {
    ffx: PathBuf,
    endpoint: Endpoint,
    remove_timeout: Duration,
}

impl Registration for FfxRegistration {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn release(&mut self) -> Result<()> {
        let address = self.endpoint.to_string();
        let Some(status) = remove_target(&self.ffx, &address, self.remove_timeout)? else {
            return Err(TargetError::QueryFailed(format!(
                "'ffx target remove {address}' killed after {}s",
                self.remove_timeout.as_secs()
            )));
        };
        if !status.success() {
            return Err(TargetError::QueryFailed(format!(
                "'ffx target remove {address}' exited with {:?}",
                status.code()
            )));
        }
        debug!("removed {address} from ffx");
        Ok(())
    }
}

/// Blocking so that it can run from a destructor. Returns `None` when the
/// child had to be killed at the deadline.
fn remove_target(ffx: &Path, address: &str, timeout: Duration) -> std::io::Result<Option<ExitStatus>> {
    let mut child = std::process::Command::new(ffx)
        .args(["target", "remove", address])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        std::thread::sleep(REMOVE_POLL_INTERVAL);
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
