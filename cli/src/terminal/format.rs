use crate::terminal::colors;
use colored::*;
use devtarget_common::Result;
use devtarget_common::config::PackageRepoSource;
use devtarget_common::network::target::{Endpoint, TargetIdentity};

pub type Detail = (String, ColoredString);

pub fn address_detail(address: &Result<Endpoint>) -> Detail {
    let value = match address {
        Ok(endpoint) => endpoint_str(endpoint).color(colors::ADDRESS),
        Err(_) => "unreachable".color(colors::MISSING),
    };
    (String::from("Address"), value)
}

/// `host:port`, always with the port the connection uses.
pub fn endpoint_str(endpoint: &Endpoint) -> String {
    if endpoint.host.contains(':') {
        format!("[{}]:{}", endpoint.host, endpoint.effective_port())
    } else {
        format!("{}:{}", endpoint.host, endpoint.effective_port())
    }
}

pub fn identity_details(identity: &TargetIdentity) -> Vec<Detail> {
    let node_name = match &identity.node_name {
        Some(name) => name.color(colors::PRIMARY),
        None => "unknown".color(colors::MISSING),
    };
    let mut details: Vec<Detail> = vec![(String::from("Node"), node_name)];
    if let Some(endpoint) = identity.endpoint() {
        details.push(address_detail(&Ok(endpoint)));
    }
    details
}

pub fn package_repo_str(source: &PackageRepoSource) -> String {
    match source {
        PackageRepoSource::External { repo_dir, .. } => repo_dir.display().to_string(),
        PackageRepoSource::Managed => String::from("managed"),
    }
}
