//! Unified error types for the meshnode workspace.
//!
//! Per-entry failures during a process-state scan never reach this type;
//! the scan swallows them and only surfaces [`MeshError::NamespaceNotFound`]
//! when nothing matched.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum MeshError {
    /// An I/O operation failed (e.g. the process-state root cannot be listed).
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// No process in the process-state tree belongs to the workload.
    #[error("no network namespace found for workload {uid}")]
    NamespaceNotFound {
        /// Workload UID that was searched for.
        uid: String,
    },

    /// The interface lacks the administrative-up flag.
    #[error("iface {iface} is not up")]
    NotUp {
        /// Interface name.
        iface: String,
    },

    /// The interface is a loopback device.
    #[error("iface {iface} is a local interface")]
    LocalInterface {
        /// Interface name.
        iface: String,
    },

    /// The link exists but is not one end of a veth pair.
    #[error("iface {iface} is not a veth link (kind: {kind})")]
    NotVeth {
        /// Interface name.
        iface: String,
        /// Link kind reported by the kernel, or `none`.
        kind: String,
    },

    /// Querying the link kind or attributes failed.
    #[error("failed to look up link {iface}: {source}")]
    LinkLookup {
        /// Interface name.
        iface: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// No interface with the given name exists.
    #[error("interface not found: {name:?}")]
    InterfaceNotFound {
        /// Requested interface name.
        name: String,
    },

    /// A TC mode outside of attach/detach was requested.
    #[error("invalid mode {mode} for tc program management")]
    InvalidMode {
        /// The raw mode value.
        mode: i32,
    },

    /// A qdisc or filter operation was rejected.
    #[error("{op} failed on link {link}: {source}")]
    LinkOperation {
        /// Operation that failed (e.g. `replace qdisc`).
        op: &'static str,
        /// Name of the link the operation targeted.
        link: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Entering a network namespace failed.
    #[error("namespace entry failed for {path}: {source}")]
    NamespaceEntry {
        /// Namespace path being entered.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MeshError>;
