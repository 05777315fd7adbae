//! Workload network namespace resolution.
//!
//! A scan lists the process-state root once, then walks the numeric
//! entries in listing order. Each distinct namespace inode has its cgroup
//! read at most once per scan; the first process whose cgroup embeds the
//! workload UID wins. Per-entry failures (the process exited, the cgroup
//! file vanished) skip that entry and never fail the scan.

use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

use meshnode_common::config::NodeConfig;
use meshnode_common::constants::{HOST_INIT_PID, NETNS_SUFFIX};
use meshnode_common::error::{MeshError, Result};
use meshnode_common::types::{NamespacePath, WorkloadUid};

use crate::cgroup::{CgroupMatcher, KubepodsMatcher};
use crate::procfs::{ProcEntry, ProcFs, ProcRoot, is_process, rooted_view};

/// Namespace inodes already evaluated during one scan.
#[derive(Debug, Default)]
pub struct NetnsObserved(HashSet<u64>);

impl NetnsObserved {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `inode`, returning `false` if it was already present.
    pub fn insert(&mut self, inode: u64) -> bool {
        self.0.insert(inode)
    }

    /// Returns whether `inode` was recorded.
    #[must_use]
    pub fn contains(&self, inode: u64) -> bool {
        self.0.contains(&inode)
    }

    /// Number of distinct namespaces recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolves workload UIDs to network namespace paths.
///
/// Holds no mutable state; concurrent calls are independent.
#[derive(Debug, Clone)]
pub struct NamespaceResolver<P = ProcRoot, M = KubepodsMatcher> {
    proc: P,
    matcher: M,
    /// Directory prefix of produced namespace paths.
    label: PathBuf,
}

impl NamespaceResolver {
    /// Builds a resolver over the process-state tree selected by `config`.
    #[must_use]
    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(rooted_view(&config.proc_root), config.proc_label())
    }
}

impl<P: ProcFs> NamespaceResolver<P> {
    /// Creates a resolver using the kubepods cgroup matcher.
    ///
    /// `label` prefixes every produced path, normally the directory the
    /// view is rooted at.
    #[must_use]
    pub fn new(proc: P, label: impl Into<PathBuf>) -> Self {
        Self::with_matcher(proc, label, KubepodsMatcher)
    }
}

impl<P: ProcFs, M: CgroupMatcher> NamespaceResolver<P, M> {
    /// Creates a resolver with a custom cgroup matcher.
    #[must_use]
    pub fn with_matcher(proc: P, label: impl Into<PathBuf>, matcher: M) -> Self {
        Self {
            proc,
            matcher,
            label: label.into(),
        }
    }

    /// Returns the process-state tree this resolver scans.
    pub const fn proc(&self) -> &P {
        &self.proc
    }

    /// Returns the path of the node's root network namespace.
    #[must_use]
    pub fn host_namespace_path(&self) -> NamespacePath {
        self.namespace_path(HOST_INIT_PID)
    }

    /// Returns the namespace path of the workload's pod.
    ///
    /// # Errors
    ///
    /// See [`NamespaceResolver::find_namespace_for_workload`].
    pub fn pod_namespace_path(&self, uid: &WorkloadUid) -> Result<NamespacePath> {
        self.find_namespace_for_workload(uid)
    }

    /// Scans process state for a process belonging to `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::Io`] if the root cannot be listed and
    /// [`MeshError::NamespaceNotFound`] if no process matches.
    pub fn find_namespace_for_workload(&self, uid: &WorkloadUid) -> Result<NamespacePath> {
        let entries = self.proc.entries().map_err(|e| MeshError::Io {
            path: self.label.clone(),
            source: e,
        })?;

        let mut observed = NetnsObserved::new();
        for entry in &entries {
            match self.process_entry(&mut observed, uid, entry) {
                Ok(Some(path)) => {
                    tracing::debug!(uid = %uid, path = %path, "found workload namespace");
                    return Ok(path);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(entry = %entry.name(), error = %e, "skipping proc entry");
                }
            }
        }

        tracing::warn!(uid = %uid, namespaces = observed.len(), "no matching network namespace");
        Err(MeshError::NamespaceNotFound {
            uid: uid.to_string(),
        })
    }

    /// Evaluates a single listing entry.
    ///
    /// Returns `Ok(None)` for non-process entries, already observed
    /// namespaces, and processes of other workloads. Errors are per-entry
    /// and meant to be skipped by the caller.
    pub fn process_entry<E: ProcEntry + ?Sized>(
        &self,
        observed: &mut NetnsObserved,
        uid: &WorkloadUid,
        entry: &E,
    ) -> io::Result<Option<NamespacePath>> {
        if !is_process(entry) {
            return Ok(None);
        }
        let pid = entry.name();

        let inode = self.proc.netns_inode(&pid)?;
        if !observed.insert(inode) {
            return Ok(None);
        }

        let cgroup = self.proc.cgroup(&pid)?;
        if !self.matcher.matches(&cgroup, uid) {
            return Ok(None);
        }
        Ok(Some(self.namespace_path(&pid)))
    }

    fn namespace_path(&self, pid: &str) -> NamespacePath {
        NamespacePath::new(
            self.label
                .join(pid)
                .join(NETNS_SUFFIX)
                .to_string_lossy()
                .into_owned(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::procfs::{LiveProcFs, ProcSnapshot, ProcessEntry};

    /// Counts cgroup reads of the wrapped tree.
    #[derive(Debug)]
    struct Counting<P> {
        inner: P,
        cgroup_reads: AtomicUsize,
    }

    impl<P: ProcFs> Counting<P> {
        fn new(inner: P) -> Self {
            Self {
                inner,
                cgroup_reads: AtomicUsize::new(0),
            }
        }
    }

    impl<P: ProcFs> ProcFs for Counting<P> {
        fn entries(&self) -> io::Result<Vec<ProcessEntry>> {
            self.inner.entries()
        }

        fn netns_inode(&self, pid: &str) -> io::Result<u64> {
            self.inner.netns_inode(pid)
        }

        fn cgroup(&self, pid: &str) -> io::Result<String> {
            let _ = self.cgroup_reads.fetch_add(1, Ordering::SeqCst);
            self.inner.cgroup(pid)
        }
    }

    fn two_pods() -> ProcSnapshot {
        ProcSnapshot::new()
            .with_entry("self", true)
            .with_entry("uptime", false)
            .with_process("1234", 4_026_532_001, "12:pids:/kubepods/pod123-456-789\n")
            .with_process("5678", 4_026_532_002, "12:pids:/kubepods/pod987-654-321\n")
    }

    fn uid(s: &str) -> WorkloadUid {
        WorkloadUid::new(s)
    }

    #[test]
    fn host_namespace_path_is_fixed() {
        let resolver = NamespaceResolver::new(two_pods(), "/host/proc");
        assert_eq!(resolver.host_namespace_path().as_str(), "/host/proc/1/ns/net");

        let empty = NamespaceResolver::new(ProcSnapshot::new(), "/host/proc");
        assert_eq!(empty.host_namespace_path(), resolver.host_namespace_path());
    }

    #[test]
    fn host_namespace_path_from_default_config() {
        let resolver = NamespaceResolver::from_config(&NodeConfig::default());
        assert_eq!(resolver.host_namespace_path().as_str(), "/host/proc/1/ns/net");
    }

    #[test]
    fn finds_matching_workload() {
        let resolver = NamespaceResolver::new(two_pods(), "/host/proc");
        let path = resolver
            .find_namespace_for_workload(&uid("123-456-789"))
            .expect("should match pid 1234");
        assert_eq!(path.as_str(), "/host/proc/1234/ns/net");

        let path = resolver
            .pod_namespace_path(&uid("987-654-321"))
            .expect("should match pid 5678");
        assert_eq!(path.as_str(), "/host/proc/5678/ns/net");
    }

    #[test]
    fn unknown_workload_is_not_found() {
        let resolver = NamespaceResolver::new(two_pods(), "/host/proc");
        let err = resolver
            .find_namespace_for_workload(&uid("000-000-000"))
            .unwrap_err();
        assert!(matches!(err, MeshError::NamespaceNotFound { .. }));
    }

    #[test]
    fn empty_uid_is_not_found() {
        let resolver = NamespaceResolver::new(two_pods(), "/host/proc");
        assert!(resolver.pod_namespace_path(&uid("")).is_err());
    }

    #[test]
    fn builtin_snapshot_has_no_pods() {
        let resolver = NamespaceResolver::new(ProcSnapshot::builtin(), "/host/proc");
        assert!(resolver.pod_namespace_path(&uid("test-uid-123")).is_err());
    }

    #[test]
    fn unlistable_root_is_io_error() {
        let resolver = NamespaceResolver::new(LiveProcFs::new("/nonexistent/proc"), "/nonexistent/proc");
        let err = resolver
            .find_namespace_for_workload(&uid("123"))
            .unwrap_err();
        assert!(matches!(err, MeshError::Io { .. }));
    }

    #[test]
    fn process_entry_ignores_non_process() {
        let resolver = NamespaceResolver::new(two_pods(), "/host/proc");
        let mut observed = NetnsObserved::new();
        let result = resolver
            .process_entry(&mut observed, &uid("test-uid"), &ProcessEntry::new("test", true))
            .expect("non-process entries are not errors");
        assert_eq!(result, None);
        assert!(observed.is_empty());
    }

    #[test]
    fn process_entry_without_namespace_handle_errors() {
        let resolver = NamespaceResolver::new(ProcSnapshot::new().with_entry("1234", true), "/p");
        let mut observed = NetnsObserved::new();
        assert!(
            resolver
                .process_entry(&mut observed, &uid("test-uid"), &ProcessEntry::new("1234", true))
                .is_err()
        );
    }

    #[test]
    fn shared_namespace_is_observed_once() {
        let snapshot = ProcSnapshot::new()
            .with_process("100", 4_026_532_100, "0::/kubepods/podaaa/pause\n")
            .with_process("101", 4_026_532_100, "0::/kubepods/podaaa/app\n");
        let resolver = NamespaceResolver::new(Counting::new(snapshot), "/host/proc");
        let mut observed = NetnsObserved::new();

        for pid in ["100", "101"] {
            let result = resolver
                .process_entry(&mut observed, &uid("bbb"), &ProcessEntry::new(pid, true))
                .expect("entry");
            assert_eq!(result, None);
        }

        assert_eq!(observed.len(), 1);
        assert!(observed.contains(4_026_532_100));
        assert_eq!(resolver.proc().cgroup_reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn full_scan_reads_shared_cgroup_once() {
        let snapshot = ProcSnapshot::new()
            .with_process("100", 4_026_532_100, "0::/kubepods/podaaa/pause\n")
            .with_process("101", 4_026_532_100, "0::/kubepods/podaaa/app\n");
        let resolver = NamespaceResolver::new(Counting::new(snapshot), "/host/proc");

        let err = resolver
            .find_namespace_for_workload(&uid("bbb"))
            .unwrap_err();
        assert!(matches!(err, MeshError::NamespaceNotFound { .. }));
        assert_eq!(resolver.proc().cgroup_reads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scan_skips_vanished_processes() {
        let snapshot = ProcSnapshot::new()
            .with_entry("10", true)
            .with_vanished_cgroup("11", 4_026_532_011)
            .with_process("12", 4_026_532_012, "0::/kubepods/besteffort/podfeed/c1\n");
        let resolver = NamespaceResolver::new(snapshot, "/host/proc");
        let path = resolver
            .find_namespace_for_workload(&uid("feed"))
            .expect("vanished entries are skipped");
        assert_eq!(path.as_str(), "/host/proc/12/ns/net");
    }

    #[test]
    fn first_match_wins() {
        let snapshot = ProcSnapshot::new()
            .with_process("300", 4_026_532_300, "0::/kubepods/podcafe/pause\n")
            .with_process("200", 4_026_532_200, "0::/kubepods/podcafe/app\n");
        let resolver = NamespaceResolver::new(snapshot, "/host/proc");
        let path = resolver
            .find_namespace_for_workload(&uid("cafe"))
            .expect("match");
        assert_eq!(path.as_str(), "/host/proc/300/ns/net");
    }

    #[test]
    fn live_tree_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (pid, pod) in [("1234", "123-456-789"), ("5678", "987-654-321")] {
            let proc_dir = dir.path().join(pid);
            std::fs::create_dir_all(proc_dir.join("ns")).expect("mkdir");
            std::fs::write(proc_dir.join("ns/net"), b"").expect("write net");
            std::fs::write(proc_dir.join("cgroup"), format!("12:pids:/kubepods/pod{pod}\n"))
                .expect("write cgroup");
        }
        std::fs::create_dir_all(dir.path().join("sys")).expect("mkdir sys");

        let root = dir.path().to_string_lossy().into_owned();
        let config = NodeConfig {
            proc_root: root.clone(),
            ..NodeConfig::default()
        };
        let resolver = NamespaceResolver::from_config(&config);

        let path = resolver
            .find_namespace_for_workload(&uid("123-456-789"))
            .expect("match");
        assert_eq!(path.as_str(), format!("{root}/1234/ns/net"));
        assert!(
            resolver
                .find_namespace_for_workload(&uid("000-000-000"))
                .is_err()
        );
    }
}
