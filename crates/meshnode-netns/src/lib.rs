//! # meshnode-netns
//!
//! Locates the network namespace of a workload on the host.
//!
//! - **Process state**: a rooted, read-only view of `/proc`, either a live
//!   directory (usually a bind mount of the host's `/proc`) or an embedded
//!   snapshot.
//! - **Cgroup matching**: pluggable rules that recognize a pod UID inside a
//!   process's cgroup paths.
//! - **Resolution**: a scan of process entries that returns the first
//!   `<root>/<pid>/ns/net` whose cgroup belongs to the workload.
//! - **Entry**: running a closure inside a resolved namespace.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod enter;
pub mod procfs;
pub mod resolver;

pub use cgroup::{CgroupMatcher, KubepodsMatcher};
pub use enter::{NamespaceEntry, SetnsEntry};
pub use procfs::{ProcFs, ProcRoot, ProcSnapshot, rooted_view};
pub use resolver::{NamespaceResolver, NetnsObserved};
