//! CLI command definitions and dispatch.

pub mod link;
pub mod netns;
pub mod tc;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use meshnode_common::config::NodeConfig;
use meshnode_common::constants::{BIN_NAME, PROC_ROOT_ENV};

/// meshctl: inspect workload namespaces, veth links and TC hooks.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// JSON node configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Host process-state root. Overrides the configuration file; an empty
    /// value selects the embedded snapshot.
    #[arg(long, global = true, env = PROC_ROOT_ENV)]
    pub proc_root: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Locate network namespaces.
    Netns(netns::NetnsArgs),
    /// Inspect network links.
    Link(link::LinkArgs),
    /// Manage clsact qdiscs and program filters.
    Tc(tc::TcArgs),
}

impl Cli {
    /// Node configuration from `--config`, with `--proc-root` applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file cannot be loaded.
    pub fn node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => NodeConfig::default(),
        };
        if let Some(root) = &self.proc_root {
            config.proc_root.clone_from(root);
        }
        Ok(config)
    }
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.node_config()?;
    match cli.command {
        Command::Netns(args) => netns::execute(args, &config, cli.json),
        Command::Link(args) => link::execute(args, cli.json),
        Command::Tc(args) => tc::execute(args, &config),
    }
}
