use std::sync::Arc;
use std::time::Instant;

use colored::*;
use devtarget_common::network::target::DiscoveredNode;
use devtarget_common::success;
use devtarget_core::adapters::ffx::FfxDiscovery;
use devtarget_core::adapters::process::TokioProcessRunner;
use devtarget_core::ports::DiscoveryService;
use tracing::{Instrument, info_span};

use crate::commands::DeviceArgs;
use crate::terminal::format::{self, Detail};
use crate::terminal::print;

pub async fn discover(args: &DeviceArgs) -> anyhow::Result<()> {
    let discovery = FfxDiscovery::new(&args.ffx, Arc::new(TokioProcessRunner));
    let start_time: Instant = Instant::now();

    let nodes: Vec<DiscoveredNode> = discovery
        .list_targets()
        .instrument(info_span!("discovery", indicatif.pb_show = true))
        .await?;

    if nodes.is_empty() {
        print::header("zero devices detected");
        print::no_results();
        return Ok(());
    }

    print::header("visible devices");
    for (idx, node) in nodes.iter().enumerate() {
        print_node(&discovery, node, idx).await;
    }

    let count: ColoredString = format!("{} devices", nodes.len()).bold().green();
    let elapsed: ColoredString = format!("{:.2}s", start_time.elapsed().as_secs_f64()).bold().yellow();
    success!("Discovery complete: {count} visible in {elapsed}");
    print::end_of_program();
    Ok(())
}

async fn print_node(discovery: &FfxDiscovery, node: &DiscoveredNode, idx: usize) {
    let Some(name) = node.announced_name() else {
        print::tree_head(idx, "not announced yet");
        return;
    };

    print::tree_head(idx, name);
    let details: Vec<Detail> = vec![format::address_detail(&discovery.ssh_address(name).await)];
    print::as_tree_one_level(&details);
}
