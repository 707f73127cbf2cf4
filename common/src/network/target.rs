//! # Device Target Model
//!
//! Describes how a single device is identified and reached:
//! * By **node name**, the identity it announces on the local network.
//! * By **endpoint**, the SSH address (`host[:port]`) it can be reached at.
//!
//! After a successful discovery both are known together.

use std::fmt;
use std::str::FromStr;

/// Port assumed by the SSH transport when none is given.
///
/// An endpoint on this port is stored as "unspecified" so that downstream
/// tooling keeps relying on its own default instead of an explicit `-p 22`.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Node name reported by the discovery service before a device has finished
/// announcing itself.
pub const UNKNOWN_NODE_NAME: &str = "<unknown>";

/// A reachable SSH address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: Option<u16>,
}

impl Endpoint {
    /// Creates an endpoint, folding [`DEFAULT_SSH_PORT`] into `None`.
    pub fn new(host: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            host: host.into(),
            port: port.filter(|p| *p != DEFAULT_SSH_PORT),
        }
    }

    /// The port a connection will actually use.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_SSH_PORT)
    }

    fn is_ipv6(&self) -> bool {
        self.host.contains(':')
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.port, self.is_ipv6()) {
            (Some(port), true) => write!(f, "[{}]:{port}", self.host),
            (Some(port), false) => write!(f, "{}:{port}", self.host),
            (None, _) => write!(f, "{}", self.host),
        }
    }
}

impl FromStr for Endpoint {
    type Err = String;

    /// Parses an SSH address.
    ///
    /// Supported formats:
    /// * **Host**: "192.168.42.7", "fuchsia-5254.local", "fe80::1%eth0".
    /// * **Host and port**: "192.168.42.7:8022".
    /// * **Bracketed IPv6 with port**: "[fe80::1%eth0]:22".
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err("empty address".to_string());
        }

        if let Some(rest) = s.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| format!("unterminated IPv6 address: {s}"))?;
            let port = match tail.strip_prefix(':') {
                Some(port) => Some(parse_port(port, s)?),
                None if tail.is_empty() => None,
                None => return Err(format!("invalid address: {s}")),
            };
            return Ok(Endpoint::new(host, port));
        }

        match s.rsplit_once(':') {
            // A bare IPv6 address has several colons and no port.
            Some((host, _)) if host.contains(':') => Ok(Endpoint::new(s, None)),
            Some((host, port)) => Ok(Endpoint::new(host, Some(parse_port(port, s)?))),
            None => Ok(Endpoint::new(s, None)),
        }
    }
}

fn parse_port(port: &str, whole: &str) -> Result<u16, String> {
    port.parse::<u16>()
        .map_err(|e| format!("invalid port in '{whole}': {e}"))
}

/// What a device session is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelector {
    /// The discovery service already knows the route to this node.
    Node(String),
    /// The discovery service has to be told how to reach this address.
    Address(Endpoint),
}

impl fmt::Display for TargetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetSelector::Node(name) => write!(f, "{name}"),
            TargetSelector::Address(endpoint) => write!(f, "{endpoint}"),
        }
    }
}

/// The identity of the device being managed.
///
/// At construction time at most one of `host` and `node_name` drives
/// discovery. Discovery fills in the other half.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetIdentity {
    pub node_name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl TargetIdentity {
    pub fn new(node_name: Option<String>, host: Option<String>, port: Option<u16>) -> Self {
        Self {
            node_name,
            host,
            port: port.filter(|p| *p != DEFAULT_SSH_PORT),
        }
    }

    /// The SSH endpoint, if the host is known.
    pub fn endpoint(&self) -> Option<Endpoint> {
        self.host
            .as_ref()
            .map(|host| Endpoint::new(host.clone(), self.port))
    }

    /// A discovered identity with both halves populated.
    pub fn discovered(node_name: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            node_name: Some(node_name.into()),
            host: Some(endpoint.host),
            port: endpoint.port,
        }
    }
}

impl fmt::Display for TargetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.node_name, self.endpoint()) {
            (Some(name), Some(endpoint)) => write!(f, "\"{name}\" at {endpoint}"),
            (Some(name), None) => write!(f, "\"{name}\""),
            (None, Some(endpoint)) => write!(f, "{endpoint}"),
            (None, None) => write!(f, "<unresolved device>"),
        }
    }
}

/// An entry returned by the discovery service's target listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredNode {
    pub nodename: Option<String>,
}

impl DiscoveredNode {
    pub fn named(nodename: impl Into<String>) -> Self {
        Self {
            nodename: Some(nodename.into()),
        }
    }

    /// The announced node name, unless the device has not announced one yet.
    pub fn announced_name(&self) -> Option<&str> {
        self.nodename
            .as_deref()
            .filter(|name| !name.is_empty() && *name != UNKNOWN_NODE_NAME)
    }
}

/// Outcome of a single discovery attempt.
///
/// More than one candidate is not a variant: it is reported as
/// [`crate::TargetError::DiscoveryAmbiguous`] so that it cannot be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryResult {
    NotFound,
    Found { node_name: String, endpoint: Endpoint },
}

impl DiscoveryResult {
    pub fn is_found(&self) -> bool {
        matches!(self, DiscoveryResult::Found { .. })
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
