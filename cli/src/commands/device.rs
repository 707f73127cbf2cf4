use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use devtarget_common::config::expand_home;
use devtarget_common::success;
use devtarget_core::adapters::ffx::FfxDiscovery;
use devtarget_core::adapters::process::TokioProcessRunner;
use devtarget_core::adapters::ssh::SshSessionFactory;
use devtarget_core::ports::ProcessRunner;
use devtarget_core::sdk::{GnSdk, resolve_ssh_config};
use devtarget_core::{DeviceTarget, Services};

use crate::commands::DeviceArgs;
use crate::terminal::{format, print};

/// What to do with the device once the target is set up.
pub enum Action {
    Prepare,
    Reboot,
    Exec(Vec<String>),
}

/// Runs `action` against the device. The target is stopped on every path.
pub async fn run(args: &DeviceArgs, action: Action) -> anyhow::Result<()> {
    let mut target = build(args).await?;

    let result = match action {
        Action::Prepare => prepare(&mut target).await,
        Action::Reboot => reboot(&mut target).await,
        Action::Exec(command) => exec(&mut target, &command).await,
    };

    // `stop` logs its own failure, which never replaces the primary result.
    let _ = target.stop().await;
    print::end_of_program();
    result
}

async fn build(args: &DeviceArgs) -> anyhow::Result<DeviceTarget> {
    let config = args.to_config();
    config.validate()?;

    let processes: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);
    let sdk = args
        .sdk_script
        .as_deref()
        .map(|script| GnSdk::new(expand_home(script), processes.clone()));

    let ssh_config = resolve_ssh_config(&config.ssh_config_source(), sdk.as_ref())
        .await
        .context("Could not get Fuchsia ssh config file")?;

    let services = Services {
        discovery: Arc::new(FfxDiscovery::new(&args.ffx, processes.clone())),
        sessions: Arc::new(SshSessionFactory::new(ssh_config, processes.clone())),
        processes,
        sdk,
    };
    Ok(DeviceTarget::new(config, services)?)
}

async fn prepare(target: &mut DeviceTarget) -> anyhow::Result<()> {
    print::header("preparing device");
    target.start().await?;
    summary(target);
    Ok(())
}

async fn reboot(target: &mut DeviceTarget) -> anyhow::Result<()> {
    print::header("preparing device");
    target.start().await?;
    print::header("rebooting device");
    target.restart().await?;
    summary(target);
    Ok(())
}

async fn exec(target: &mut DeviceTarget, command: &[String]) -> anyhow::Result<()> {
    print::header("preparing device");
    target.start().await?;

    let command: Vec<&str> = command.iter().map(String::as_str).collect();
    let output = target.run_command(&command).await?;

    std::io::stdout().write_all(output.stdout.as_bytes())?;
    std::io::stderr().write_all(output.stderr.as_bytes())?;

    if !output.success() {
        bail!(
            "'{}' exited with code {}",
            command.join(" "),
            output.exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".into())
        );
    }
    Ok(())
}

fn summary(target: &DeviceTarget) {
    print::header("device ready");
    print::as_tree_one_level(&format::identity_details(target.identity()));
    print::aligned_line("State", target.state());
    print::aligned_line("OS check", target.os_check());
    print::aligned_line("Packages", format::package_repo_str(target.package_repo()));
    success!("Device target {} is ready.", target.identity());
}
