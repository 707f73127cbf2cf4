//! # Target configuration
//!
//! The operator-facing settings of a device target and the invariants they
//! must satisfy before anything touches the network.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, TargetError};

/// OS version enforcement policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OsCheck {
    /// Abort when the installed version differs from the image.
    Check,
    /// Repave the device when the installed version differs from the image.
    Update,
    /// Never compare versions.
    #[default]
    Ignore,
}

impl FromStr for OsCheck {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "check" => Ok(OsCheck::Check),
            "update" => Ok(OsCheck::Update),
            "ignore" => Ok(OsCheck::Ignore),
            other => Err(format!(
                "invalid os-check policy '{other}', expected one of: check, update, ignore"
            )),
        }
    }
}

impl fmt::Display for OsCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OsCheck::Check => "check",
            OsCheck::Update => "update",
            OsCheck::Ignore => "ignore",
        };
        f.write_str(s)
    }
}

/// Where the SSH configuration used to reach the device comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshConfigSource {
    /// Passed on the command line.
    Explicit(PathBuf),
    /// Keys generated by a local Fuchsia build.
    FuchsiaOutDir(PathBuf),
    /// Asked from the SDK helper scripts.
    Sdk,
}

/// Where application packages are served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageRepoSource {
    /// A repository published by a local Fuchsia build.
    External { repo_dir: PathBuf, build_ids_dir: PathBuf },
    /// An ephemeral repository managed for the lifetime of the target.
    Managed,
}

/// Retry budgets and delays of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Discovery attempts after a device has been paved.
    pub boot_discovery_attempts: u32,
    /// Delay between two post-paving discovery attempts.
    pub boot_discovery_delay: Duration,
    /// Time between a reboot command and the first reconnection attempt.
    pub reboot_settle: Duration,
    /// Upper bound for a session to become attachable.
    pub attach_timeout: Duration,
    /// Delay between two SSH reachability probes.
    pub attach_retry_interval: Duration,
    /// Upper bound for the paving subprocess.
    pub pave_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            boot_discovery_attempts: 30,
            boot_discovery_delay: Duration::from_secs(4),
            reboot_settle: Duration::from_secs(20),
            attach_timeout: Duration::from_secs(120),
            attach_retry_interval: Duration::from_secs(1),
            pave_timeout: Duration::from_secs(300),
        }
    }
}

/// Settings of a single device target.
#[derive(Debug, Clone, Default)]
pub struct TargetConfig {
    /// Address of the device. Disables discovery.
    pub host: Option<String>,
    /// Node name of the device to use.
    pub node_name: Option<String>,
    /// Port of the SSH service on the device.
    pub port: Option<u16>,
    /// Explicit SSH configuration file.
    pub ssh_config: Option<PathBuf>,
    /// Output directory of a local Fuchsia build the device was paved with.
    pub fuchsia_out_dir: Option<PathBuf>,
    /// Version enforcement policy as requested by the operator.
    pub os_check: OsCheck,
    /// Directory holding the image used to pave the device.
    pub system_image_dir: Option<PathBuf>,
    /// Authorized keys installed on the device when paving.
    pub authorized_keys: Option<PathBuf>,
    pub timings: Timings,
}

impl TargetConfig {
    /// Checks the invariants between settings.
    pub fn validate(&self) -> Result<()> {
        if self.system_image_dir.is_none() && self.os_check != OsCheck::Ignore {
            return Err(TargetError::Configuration(
                "image directory must be provided if a repave is needed (--system-image-dir)"
                    .to_string(),
            ));
        }

        if self.host.is_some() && self.node_name.is_some() {
            return Err(TargetError::Configuration(
                "only one of \"--host\" or \"--node-name\" can be specified".to_string(),
            ));
        }

        if self.fuchsia_out_dir.is_some() && self.ssh_config.is_some() {
            return Err(TargetError::Configuration(
                "only one of \"--fuchsia-out-dir\" or \"--ssh-config\" can be specified"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// The policy actually applied.
    ///
    /// Devices paved from a local Fuchsia build are never version checked.
    pub fn effective_os_check(&self) -> OsCheck {
        if self.fuchsia_out_dir.is_some() {
            OsCheck::Ignore
        } else {
            self.os_check
        }
    }

    pub fn ssh_config_source(&self) -> SshConfigSource {
        if let Some(out_dir) = &self.fuchsia_out_dir {
            SshConfigSource::FuchsiaOutDir(
                expand_home(out_dir).join("ssh-keys").join("ssh_config"),
            )
        } else if let Some(ssh_config) = &self.ssh_config {
            SshConfigSource::Explicit(expand_home(ssh_config))
        } else {
            SshConfigSource::Sdk
        }
    }

    pub fn package_repo_source(&self) -> PackageRepoSource {
        match &self.fuchsia_out_dir {
            Some(out_dir) => {
                let out_dir = expand_home(out_dir);
                PackageRepoSource::External {
                    repo_dir: out_dir.join("amber-files"),
                    build_ids_dir: out_dir.join(".build-id"),
                }
            }
            None => PackageRepoSource::Managed,
        }
    }
}

/// Expands a leading `~` against `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
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
