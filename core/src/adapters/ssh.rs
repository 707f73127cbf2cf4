//! Control sessions over OpenSSH.
//!
//! Every command is its own `ssh` invocation. The SSH config supplied by the
//! SDK enables connection multiplexing, so terminating a session means asking
//! the master connection to exit (`ssh -O exit`).

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use devtarget_common::network::target::Endpoint;
use devtarget_common::{Result, TargetError};

use crate::ports::{CommandOutput, ProcessOutcome, ProcessRunner, RemoteSession, SessionFactory};

const SSH: &str = "ssh";

/// Used when the caller does not bound a command.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct SshSessionFactory {
    ssh_config: PathBuf,
    processes: Arc<dyn ProcessRunner>,
}

impl SshSessionFactory {
    pub fn new(ssh_config: impl Into<PathBuf>, processes: Arc<dyn ProcessRunner>) -> Self {
        Self {
            ssh_config: ssh_config.into(),
            processes,
        }
    }
}

impl SessionFactory for SshSessionFactory {
    fn open(&self, endpoint: &Endpoint) -> Box<dyn RemoteSession> {
        Box::new(SshSession {
            ssh_config: self.ssh_config.clone(),
            endpoint: endpoint.clone(),
            processes: self.processes.clone(),
        })
    }
}

pub struct SshSession {
    ssh_config: PathBuf,
    endpoint: Endpoint,
    processes: Arc<dyn ProcessRunner>,
}

impl SshSession {
    /// `-F <config> [-p <port>]`. The port is omitted when it is the default.
    fn base_args(&self) -> Vec<String> {
        let mut args = vec!["-F".to_string(), self.ssh_config.display().to_string()];
        if let Some(port) = self.endpoint.port {
            args.extend(["-p".to_string(), port.to_string()]);
        }
        args
    }

    pub fn command_args(&self, command: &[&str]) -> Vec<String> {
        let mut args = self.base_args();
        args.push(self.endpoint.host.clone());
        args.push("--".to_string());
        args.extend(command.iter().map(|part| part.to_string()));
        args
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    /// A command that runs out of time is reported with no exit code.
    async fn run(&self, command: &[&str], timeout: Option<Duration>) -> Result<CommandOutput> {
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let outcome = self
            .processes
            .run(Path::new(SSH), &self.command_args(command), timeout)
            .await?;

        Ok(match outcome {
            ProcessOutcome::Exited(output) => output,
            ProcessOutcome::TimedOut => CommandOutput {
                exit_code: None,
                stdout: String::new(),
                stderr: format!("'{}' timed out after {}s", command.join(" "), timeout.as_secs()),
            },
        })
    }

    async fn terminate(&self) -> Result<()> {
        let mut args = self.base_args();
        args.extend(["-O".to_string(), "exit".to_string(), self.endpoint.host.clone()]);

        match self.processes.run(Path::new(SSH), &args, DEFAULT_TIMEOUT).await? {
            ProcessOutcome::Exited(output) if output.success() => Ok(()),
            ProcessOutcome::Exited(output) => Err(TargetError::RemoteCommand {
                command: "-O exit".to_string(),
                exit_code: output.exit_code,
                output: output.combined().trim().to_string(),
            }),
            ProcessOutcome::TimedOut => Err(TargetError::RemoteCommand {
                command: "-O exit".to_string(),
                exit_code: None,
                output: "timed out".to_string(),
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
