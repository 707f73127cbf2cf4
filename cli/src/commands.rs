pub mod device;
pub mod discover;

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use devtarget_common::config::{OsCheck, TargetConfig, Timings};

#[derive(Parser)]
#[command(name = "devtarget")]
#[command(about = "Prepares a network-attached Fuchsia device for deployment.")]
pub struct CommandLine {
    #[command(flatten)]
    pub device: DeviceArgs,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// The IP address of the target device. Disables discovery
    #[arg(long)]
    pub host: Option<String>,

    /// Name of the specific device to use
    #[arg(long, env = "FUCHSIA_NODENAME")]
    pub node_name: Option<String>,

    /// SSH port of the target device
    #[arg(short, long)]
    pub port: Option<u16>,

    /// The path to the SSH configuration used for connecting to the target
    #[arg(short = 'F', long)]
    pub ssh_config: Option<PathBuf>,

    /// Path to the output directory of a local Fuchsia build
    #[arg(long)]
    pub fuchsia_out_dir: Option<PathBuf>,

    /// Whether to check, update or ignore the OS version of the device
    #[arg(long, default_value_t = OsCheck::Ignore)]
    pub os_check: OsCheck,

    /// Directory holding the system image used to pave the device
    #[arg(long)]
    pub system_image_dir: Option<PathBuf>,

    /// Authorized keys to install on the device when paving
    #[arg(long)]
    pub authorized_keys: Option<PathBuf>,

    /// SDK helper script defining the `get-fuchsia-*` functions
    #[arg(long)]
    pub sdk_script: Option<PathBuf>,

    /// The `ffx` binary used for device discovery
    #[arg(long, default_value = "ffx")]
    pub ffx: PathBuf,
}

impl DeviceArgs {
    pub fn to_config(&self) -> TargetConfig {
        TargetConfig {
            host: self.host.clone(),
            node_name: self.node_name.clone(),
            port: self.port,
            ssh_config: self.ssh_config.clone(),
            fuchsia_out_dir: self.fuchsia_out_dir.clone(),
            os_check: self.os_check,
            system_image_dir: self.system_image_dir.clone(),
            authorized_keys: self.authorized_keys.clone(),
            timings: Timings::default(),
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List the devices visible on the local network
    #[command(alias = "d")]
    Discover,
    /// Locate the device, enforce its OS version and connect to it
    #[command(alias = "p")]
    Prepare,
    /// Prepare the device, then reboot it and reconnect
    #[command(alias = "r")]
    Reboot,
    /// Prepare the device and run a command on it
    #[command(alias = "e")]
    Exec {
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
