//! `meshctl link`: Inspect host and workload links.

use std::fmt;

use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{field, print_record};

/// Arguments for the `link` command.
#[derive(Args, Debug)]
pub struct LinkArgs {
    /// Link operation.
    #[command(subcommand)]
    pub command: LinkCommand,
}

/// `link` subcommands.
#[derive(Subcommand, Debug)]
pub enum LinkCommand {
    /// Print the index of the veth peer of an interface.
    Peer {
        /// Interface name.
        iface: String,
    },
    /// Report whether an interface holds any of the given addresses.
    HasIp {
        /// Interface name.
        iface: String,
        /// Candidate addresses; unparseable values never match.
        #[arg(required = true)]
        ips: Vec<String>,
    },
}

#[derive(Debug, Serialize)]
struct PeerRecord {
    iface: String,
    peer_index: u32,
}

impl fmt::Display for PeerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        field(f, "iface", &self.iface)?;
        field(f, "peer", self.peer_index)
    }
}

#[derive(Debug, Serialize)]
struct MembershipRecord {
    iface: String,
    addresses: Vec<String>,
    matched: bool,
}

impl fmt::Display for MembershipRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        field(f, "iface", &self.iface)?;
        field(f, "addresses", self.addresses.join(" "))?;
        field(f, "matched", self.matched)
    }
}

/// Executes the `link` command.
///
/// # Errors
///
/// Returns an error if the interface does not exist or its link cannot be
/// queried.
#[cfg(target_os = "linux")]
pub fn execute(args: LinkArgs, json: bool) -> anyhow::Result<()> {
    use meshnode_link::{DeviceResolver, InterfaceTable, SystemInterfaces, iface_contains_any_ip};

    match args.command {
        LinkCommand::Peer { iface } => {
            let peer_index = DeviceResolver::system().veth_peer_index_by_name(&iface)?;
            print_record(&PeerRecord { iface, peer_index }, json)
        }
        LinkCommand::HasIp { iface, ips } => {
            let found = SystemInterfaces.by_name(&iface)?;
            let record = MembershipRecord {
                matched: iface_contains_any_ip(&found, &ips),
                addresses: found.addresses.iter().map(ToString::to_string).collect(),
                iface,
            };
            print_record(&record, json)
        }
    }
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error.
#[cfg(not(target_os = "linux"))]
pub fn execute(_args: LinkArgs, _json: bool) -> anyhow::Result<()> {
    anyhow::bail!("Linux required for link inspection")
}
