//! Read-only views of host process state.
//!
//! The resolver never touches `std::fs` directly; it consumes a [`ProcFs`]
//! so that a live `/proc` and an in-memory tree satisfy the same contract.

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use meshnode_common::constants::{CGROUP_FILE, NETNS_SUFFIX};

/// Attributes of a directory entry the scan classifies.
pub trait ProcEntry {
    /// File name of the entry.
    fn name(&self) -> Cow<'_, str>;
    /// Whether the entry is a directory.
    fn is_dir(&self) -> bool;
}

/// A single entry of a process-state listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    name: String,
    is_dir: bool,
}

impl ProcessEntry {
    /// Creates an entry from its name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            is_dir,
        }
    }
}

impl ProcEntry for ProcessEntry {
    fn name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

impl ProcEntry for std::fs::DirEntry {
    fn name(&self) -> Cow<'_, str> {
        Cow::Owned(self.file_name().to_string_lossy().into_owned())
    }

    fn is_dir(&self) -> bool {
        self.file_type().is_ok_and(|t| t.is_dir())
    }
}

/// Returns `true` for any character outside `0`-`9`.
#[must_use]
pub const fn is_not_number(c: char) -> bool {
    !c.is_ascii_digit()
}

/// Classifies an entry as a process directory.
///
/// A directory qualifies when no character of its name is a non-digit.
/// An empty name therefore qualifies too.
pub fn is_process<E: ProcEntry + ?Sized>(entry: &E) -> bool {
    entry.is_dir() && !entry.name().chars().any(is_not_number)
}

/// Capability over a rooted process-state tree.
pub trait ProcFs: fmt::Debug + Send + Sync {
    /// Lists the entries directly below the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the root itself cannot be opened or listed.
    fn entries(&self) -> io::Result<Vec<ProcessEntry>>;

    /// Returns the inode identifying the network namespace of `pid`.
    ///
    /// # Errors
    ///
    /// Returns an error if `<pid>/ns/net` cannot be resolved, typically
    /// because the process has exited.
    fn netns_inode(&self, pid: &str) -> io::Result<u64>;

    /// Returns the contents of `<pid>/cgroup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn cgroup(&self, pid: &str) -> io::Result<String>;
}

/// Live view of a directory laid out like `/proc`.
#[derive(Debug, Clone)]
pub struct LiveProcFs {
    root: PathBuf,
}

impl LiveProcFs {
    /// Opens a view rooted at `root`. Nothing is read until the first call.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProcFs for LiveProcFs {
    fn entries(&self) -> io::Result<Vec<ProcessEntry>> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            match entry {
                Ok(entry) => entries.push(ProcessEntry::new(entry.name(), entry.is_dir())),
                Err(e) => tracing::debug!(error = %e, "skipping unreadable proc entry"),
            }
        }
        Ok(entries)
    }

    fn netns_inode(&self, pid: &str) -> io::Result<u64> {
        // metadata() follows the ns/net symlink to the nsfs inode.
        let meta = std::fs::metadata(self.root.join(pid).join(NETNS_SUFFIX))?;
        Ok(meta.ino())
    }

    fn cgroup(&self, pid: &str) -> io::Result<String> {
        std::fs::read_to_string(self.root.join(pid).join(CGROUP_FILE))
    }
}

#[derive(Debug, Clone)]
struct SnapshotEntry {
    name: String,
    is_dir: bool,
    netns: Option<u64>,
    cgroup: Option<String>,
}

/// In-memory process-state tree.
///
/// Used as the embedded default when no live root is configured and as a
/// fixture wherever a synthetic tree is needed. Entries are listed in
/// insertion order.
#[derive(Debug, Clone, Default)]
pub struct ProcSnapshot {
    entries: Vec<SnapshotEntry>,
}

/// Processes present in the embedded snapshot: pid, netns inode, cgroup.
const BUILTIN_PROCESSES: &[(&str, u64, &str)] = &[("1", 4_026_531_840, "0::/init.scope\n")];

impl ProcSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Returns the embedded default snapshot.
    #[must_use]
    pub fn builtin() -> Self {
        BUILTIN_PROCESSES
            .iter()
            .fold(Self::new(), |snapshot, &(pid, netns, cgroup)| {
                snapshot.with_process(pid, netns, cgroup)
            })
    }

    /// Adds a process directory with a namespace inode and cgroup contents.
    #[must_use]
    pub fn with_process(mut self, pid: impl Into<String>, netns: u64, cgroup: impl Into<String>) -> Self {
        self.entries.push(SnapshotEntry {
            name: pid.into(),
            is_dir: true,
            netns: Some(netns),
            cgroup: Some(cgroup.into()),
        });
        self
    }

    /// Adds a process directory whose cgroup file has disappeared.
    #[must_use]
    pub fn with_vanished_cgroup(mut self, pid: impl Into<String>, netns: u64) -> Self {
        self.entries.push(SnapshotEntry {
            name: pid.into(),
            is_dir: true,
            netns: Some(netns),
            cgroup: None,
        });
        self
    }

    /// Adds a bare entry with no namespace handle or cgroup file.
    #[must_use]
    pub fn with_entry(mut self, name: impl Into<String>, is_dir: bool) -> Self {
        self.entries.push(SnapshotEntry {
            name: name.into(),
            is_dir,
            netns: None,
            cgroup: None,
        });
        self
    }

    fn find(&self, pid: &str) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.is_dir && e.name == pid)
    }
}

fn vanished(pid: &str, what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{pid}/{what}: no such file"))
}

impl ProcFs for ProcSnapshot {
    fn entries(&self) -> io::Result<Vec<ProcessEntry>> {
        Ok(self
            .entries
            .iter()
            .map(|e| ProcessEntry::new(e.name.clone(), e.is_dir))
            .collect())
    }

    fn netns_inode(&self, pid: &str) -> io::Result<u64> {
        self.find(pid)
            .and_then(|e| e.netns)
            .ok_or_else(|| vanished(pid, NETNS_SUFFIX))
    }

    fn cgroup(&self, pid: &str) -> io::Result<String> {
        self.find(pid)
            .and_then(|e| e.cgroup.clone())
            .ok_or_else(|| vanished(pid, CGROUP_FILE))
    }
}

/// The process-state tree selected by configuration.
#[derive(Debug, Clone)]
pub enum ProcRoot {
    /// Live directory view.
    Live(LiveProcFs),
    /// Embedded snapshot.
    Builtin(ProcSnapshot),
}

/// Selects the process-state tree: the embedded snapshot when `dir` is
/// empty, otherwise a live view rooted at `dir`.
#[must_use]
pub fn rooted_view(dir: &str) -> ProcRoot {
    if dir.is_empty() {
        tracing::debug!("no proc root configured, using embedded snapshot");
        ProcRoot::Builtin(ProcSnapshot::builtin())
    } else {
        ProcRoot::Live(LiveProcFs::new(dir))
    }
}

impl ProcFs for ProcRoot {
    fn entries(&self) -> io::Result<Vec<ProcessEntry>> {
        match self {
            Self::Live(fs) => fs.entries(),
            Self::Builtin(fs) => fs.entries(),
        }
    }

    fn netns_inode(&self, pid: &str) -> io::Result<u64> {
        match self {
            Self::Live(fs) => fs.netns_inode(pid),
            Self::Builtin(fs) => fs.netns_inode(pid),
        }
    }

    fn cgroup(&self, pid: &str) -> io::Result<String> {
        match self {
            Self::Live(fs) => fs.cgroup(pid),
            Self::Builtin(fs) => fs.cgroup(pid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_not_number_accepts_only_digits() {
        for c in ['0', '5', '9'] {
            assert!(!is_not_number(c), "{c}");
        }
        for c in ['a', 'Z', '-', ' '] {
            assert!(is_not_number(c), "{c:?}");
        }
    }

    #[test]
    fn is_process_numeric_directory() {
        assert!(is_process(&ProcessEntry::new("1234", true)));
    }

    #[test]
    fn is_process_rejects_non_numeric_directory() {
        assert!(!is_process(&ProcessEntry::new("proc", true)));
    }

    #[test]
    fn is_process_rejects_numeric_file() {
        assert!(!is_process(&ProcessEntry::new("1234", false)));
    }

    #[test]
    fn is_process_rejects_mixed_name() {
        assert!(!is_process(&ProcessEntry::new("123abc", true)));
    }

    #[test]
    fn is_process_accepts_empty_name() {
        // No character disqualifies an empty name; the classifier keeps
        // this boundary as-is.
        assert!(is_process(&ProcessEntry::new("", true)));
    }

    #[test]
    fn rooted_view_empty_dir_is_builtin() {
        assert!(matches!(rooted_view(""), ProcRoot::Builtin(_)));
    }

    #[test]
    fn rooted_view_non_empty_dir_is_live() {
        match rooted_view("/tmp") {
            ProcRoot::Live(fs) => assert_eq!(fs.root(), Path::new("/tmp")),
            ProcRoot::Builtin(_) => panic!("expected live view"),
        }
    }

    #[test]
    fn builtin_snapshot_contains_init() {
        let snapshot = ProcSnapshot::builtin();
        let entries = snapshot.entries().expect("entries");
        assert!(entries.iter().any(|e| e.name() == "1" && e.is_dir()));
        assert!(snapshot.netns_inode("1").is_ok());
    }

    #[test]
    fn snapshot_missing_files_are_not_found() {
        let snapshot = ProcSnapshot::new().with_entry("42", true);
        let err = snapshot.netns_inode("42").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(
            snapshot.cgroup("42").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }

    #[test]
    fn live_view_lists_and_reads_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let proc_dir = dir.path().join("1234");
        std::fs::create_dir_all(proc_dir.join("ns")).expect("mkdir");
        std::fs::write(proc_dir.join("ns/net"), b"").expect("write net");
        std::fs::write(proc_dir.join("cgroup"), "12:pids:/kubepods/pod1\n").expect("write cgroup");
        std::fs::write(dir.path().join("uptime"), "1.0 1.0\n").expect("write uptime");

        let fs = LiveProcFs::new(dir.path());
        let mut entries = fs.entries().expect("entries");
        entries.sort_by(|a, b| a.name().cmp(&b.name()));
        assert_eq!(
            entries,
            vec![
                ProcessEntry::new("1234", true),
                ProcessEntry::new("uptime", false)
            ]
        );
        assert!(fs.netns_inode("1234").is_ok());
        assert_eq!(fs.cgroup("1234").expect("cgroup"), "12:pids:/kubepods/pod1\n");
    }

    #[test]
    fn live_view_shared_namespace_has_same_inode() {
        let dir = tempfile::tempdir().expect("tempdir");
        for pid in ["10", "11"] {
            std::fs::create_dir_all(dir.path().join(pid).join("ns")).expect("mkdir");
        }
        std::fs::write(dir.path().join("10/ns/net"), b"").expect("write");
        std::fs::hard_link(dir.path().join("10/ns/net"), dir.path().join("11/ns/net"))
            .expect("link");

        let fs = LiveProcFs::new(dir.path());
        assert_eq!(
            fs.netns_inode("10").expect("10"),
            fs.netns_inode("11").expect("11")
        );
    }

    #[test]
    fn live_view_missing_root_fails() {
        let fs = LiveProcFs::new("/nonexistent/meshnode/proc");
        assert!(fs.entries().is_err());
    }
}
