//! Queries answered by the GN SDK helper scripts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use devtarget_common::config::{SshConfigSource, expand_home};
use devtarget_common::{Result, TargetError};

use crate::ports::{ProcessOutcome, ProcessRunner};

const SDK_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

pub const SSH_CONFIG_FUNCTION: &str = "get-fuchsia-sshconfig-file";
pub const AUTH_KEYS_FUNCTION: &str = "get-fuchsia-auth-keys-file";

/// Calls shell functions defined by an SDK helper script (`fuchsia-common.sh`).
#[derive(Clone)]
pub struct GnSdk {
    script: PathBuf,
    processes: Arc<dyn ProcessRunner>,
}

impl GnSdk {
    pub fn new(script: impl Into<PathBuf>, processes: Arc<dyn ProcessRunner>) -> Self {
        Self {
            script: script.into(),
            processes,
        }
    }

    /// Sources the script and runs `function`, returning its trimmed stdout.
    pub async fn call(&self, function: &str) -> Result<String> {
        let args = [
            "-c".to_string(),
            format!("source \"$1\" && {function}"),
            "_".to_string(),
            self.script.display().to_string(),
        ];
        let outcome = self
            .processes
            .run(Path::new("bash"), &args, SDK_QUERY_TIMEOUT)
            .await?;

        match outcome {
            ProcessOutcome::Exited(output) if output.success() => Ok(output.stdout.trim().to_string()),
            ProcessOutcome::Exited(output) => Err(TargetError::Configuration(format!(
                "{function} failed with exit code {:?}: {}",
                output.exit_code,
                output.combined().trim()
            ))),
            ProcessOutcome::TimedOut => Err(TargetError::Configuration(format!(
                "{function} did not answer within {}s",
                SDK_QUERY_TIMEOUT.as_secs()
            ))),
        }
    }

    /// A path printed by `function`, with `~` expanded.
    pub async fn path(&self, function: &str) -> Result<PathBuf> {
        let raw = self.call(function).await?;
        if raw.is_empty() {
            return Err(TargetError::Configuration(format!("{function} printed no path")));
        }
        Ok(expand_home(Path::new(&raw)))
    }
}

/// Turns an SSH config source into a concrete file path.
pub async fn resolve_ssh_config(source: &SshConfigSource, sdk: Option<&GnSdk>) -> Result<PathBuf> {
    match source {
        SshConfigSource::Explicit(path) | SshConfigSource::FuchsiaOutDir(path) => Ok(path.clone()),
        SshConfigSource::Sdk => {
            let sdk = sdk.ok_or_else(|| {
                TargetError::Configuration(
                    "no SSH config given; pass --ssh-config, --fuchsia-out-dir or --sdk-script"
                        .to_string(),
                )
            })?;
            sdk.path(SSH_CONFIG_FUNCTION).await.map_err(|e| {
                TargetError::Configuration(format!("could not get Fuchsia ssh config file: {e}"))
            })
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
