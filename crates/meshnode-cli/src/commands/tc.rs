//! `meshctl tc`: Repair clsact state on a host link.

use clap::{Args, Subcommand};
use meshnode_common::config::NodeConfig;

/// Arguments for the `tc` command.
#[derive(Args, Debug)]
pub struct TcArgs {
    /// TC operation.
    #[command(subcommand)]
    pub command: TcCommand,
}

/// `tc` subcommands.
#[derive(Subcommand, Debug)]
pub enum TcCommand {
    /// Create the clsact qdisc on an interface, or replace it in place.
    EnsureQdisc {
        /// Interface name.
        iface: String,
    },
    /// Remove the program filters from both hooks of an interface.
    Detach {
        /// Interface name.
        iface: String,
    },
}

/// Executes the `tc` command.
///
/// Filter priority, handle and name come from the node configuration so
/// that a detach targets the filters the agent installed.
///
/// # Errors
///
/// Returns an error if the interface does not exist or the kernel rejects
/// the operation.
#[cfg(target_os = "linux")]
pub fn execute(args: TcArgs, config: &NodeConfig) -> anyhow::Result<()> {
    use meshnode_link::{InterfaceTable, RtnlLinkControl, SystemInterfaces, TcManager};

    let tc = TcManager::from_config(RtnlLinkControl, config);
    match args.command {
        TcCommand::EnsureQdisc { iface } => {
            let link = SystemInterfaces.by_name(&iface)?;
            tc.ensure_qdisc(&link)?;
            tracing::info!(iface = %link.name, "clsact qdisc ensured");
        }
        TcCommand::Detach { iface } => {
            let link = SystemInterfaces.by_name(&iface)?;
            tc.detach(&link)?;
        }
    }
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error.
#[cfg(not(target_os = "linux"))]
pub fn execute(_args: TcArgs, _config: &NodeConfig) -> anyhow::Result<()> {
    anyhow::bail!("Linux required for traffic-control management")
}
