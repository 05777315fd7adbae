//! `meshctl netns`: Locate host and workload network namespaces.

use std::fmt;

use anyhow::Context;
use clap::{Args, Subcommand};
use meshnode_common::config::NodeConfig;
use meshnode_common::constants::NETNS_SUFFIX;
use meshnode_common::types::WorkloadUid;
use meshnode_netns::{KubepodsMatcher, NamespaceResolver, ProcFs, rooted_view};
use serde::Serialize;

use crate::output::{field, print_record};

/// Arguments for the `netns` command.
#[derive(Args, Debug)]
pub struct NetnsArgs {
    /// Namespace operation.
    #[command(subcommand)]
    pub command: NetnsCommand,
}

/// `netns` subcommands.
#[derive(Subcommand, Debug)]
pub enum NetnsCommand {
    /// Print the node's root network namespace path.
    Host,
    /// Find the network namespace of a pod.
    Pod {
        /// Pod UID.
        uid: String,
    },
    /// Show the namespace identity and pod membership of a process.
    Inspect {
        /// Process ID below the proc root.
        pid: String,
    },
}

#[derive(Debug, Serialize)]
struct NamespaceRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    uid: Option<String>,
    path: String,
}

impl fmt::Display for NamespaceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(uid) = &self.uid {
            field(f, "uid", uid)?;
        }
        field(f, "netns", &self.path)
    }
}

#[derive(Debug, Serialize)]
struct ProcessRecord {
    pid: String,
    netns_inode: u64,
    netns: String,
    pod_uid: Option<String>,
}

impl fmt::Display for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        field(f, "pid", &self.pid)?;
        field(f, "inode", self.netns_inode)?;
        field(f, "netns", &self.netns)?;
        field(f, "pod", self.pod_uid.as_deref().unwrap_or("-"))
    }
}

/// Executes the `netns` command.
///
/// # Errors
///
/// Returns an error if the process state cannot be read or no namespace
/// matches.
pub fn execute(args: NetnsArgs, config: &NodeConfig, json: bool) -> anyhow::Result<()> {
    let resolver = NamespaceResolver::from_config(config);
    match args.command {
        NetnsCommand::Host => print_record(
            &NamespaceRecord {
                uid: None,
                path: resolver.host_namespace_path().to_string(),
            },
            json,
        ),
        NetnsCommand::Pod { uid } => {
            let path = resolver.pod_namespace_path(&WorkloadUid::new(uid.as_str()))?;
            print_record(
                &NamespaceRecord {
                    uid: Some(uid),
                    path: path.to_string(),
                },
                json,
            )
        }
        NetnsCommand::Inspect { pid } => print_record(&inspect(config, pid)?, json),
    }
}

fn inspect(config: &NodeConfig, pid: String) -> anyhow::Result<ProcessRecord> {
    let proc = rooted_view(&config.proc_root);
    let netns_inode = proc
        .netns_inode(&pid)
        .with_context(|| format!("reading network namespace of {pid}"))?;
    let cgroup = proc
        .cgroup(&pid)
        .with_context(|| format!("reading cgroup of {pid}"))?;
    let netns = config
        .proc_label()
        .join(&pid)
        .join(NETNS_SUFFIX)
        .to_string_lossy()
        .into_owned();
    Ok(ProcessRecord {
        pod_uid: KubepodsMatcher.pod_uid(&cgroup),
        pid,
        netns_inode,
        netns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builtin() -> NodeConfig {
        NodeConfig {
            proc_root: String::new(),
            ..NodeConfig::default()
        }
    }

    #[test]
    fn inspect_reads_embedded_init_process() {
        let record = inspect(&builtin(), "1".into()).expect("inspect");
        assert_eq!(record.netns, "/host/proc/1/ns/net");
        assert_eq!(record.pod_uid, None);
    }

    #[test]
    fn inspect_reports_pod_uid_from_live_tree() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join("42");
        std::fs::create_dir_all(dir.join("ns")).expect("mkdir");
        std::fs::write(dir.join("ns/net"), "").expect("netns");
        std::fs::write(dir.join("cgroup"), "0::/kubepods/burstable/podaa-bb/cc\n").expect("cgroup");

        let config = NodeConfig {
            proc_root: root.path().to_string_lossy().into_owned(),
            ..NodeConfig::default()
        };
        let record = inspect(&config, "42".into()).expect("inspect");
        assert_eq!(record.pod_uid.as_deref(), Some("aa-bb"));
        assert!(record.netns.ends_with("/42/ns/net"));
    }

    #[test]
    fn inspect_missing_process_fails() {
        assert!(inspect(&builtin(), "999999".into()).is_err());
    }
}
