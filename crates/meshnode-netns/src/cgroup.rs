//! Recognizing a workload inside `/proc/<pid>/cgroup`.
//!
//! Each line of the file reads `<hierarchy-id>:<controllers>:<path>`. The
//! kubelet embeds the pod UID in one path segment right after a `pod`
//! marker, e.g.
//!
//! - cgroupfs driver: `/kubepods/burstable/pod1c7e0c1a-.../<container>`
//! - systemd driver: `/kubepods.slice/kubepods-burstable-pod1c7e0c1a_....slice/...`
//!
//! The systemd driver replaces dashes in the UID with underscores.

use std::fmt;

use meshnode_common::constants::{POD_CGROUP_MARKER, SYSTEMD_SLICE_SUFFIX};
use meshnode_common::types::WorkloadUid;

/// Decides whether a process's cgroup membership belongs to a workload.
pub trait CgroupMatcher: fmt::Debug + Send + Sync {
    /// Returns `true` if `cgroup` (the full file contents) embeds `uid`.
    fn matches(&self, cgroup: &str, uid: &WorkloadUid) -> bool;
}

/// Matcher for the kubelet's `kubepods` hierarchy under either cgroup driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubepodsMatcher;

impl KubepodsMatcher {
    /// Returns the first pod UID embedded in `cgroup`, normalized to dashes.
    #[must_use]
    pub fn pod_uid(&self, cgroup: &str) -> Option<String> {
        pod_uids(cgroup).next()
    }
}

impl CgroupMatcher for KubepodsMatcher {
    fn matches(&self, cgroup: &str, uid: &WorkloadUid) -> bool {
        let wanted = normalize(uid.as_str());
        pod_uids(cgroup).any(|found| found == wanted)
    }
}

fn normalize(uid: &str) -> String {
    uid.replace('_', "-")
}

fn is_uid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Yields every UID found after a `pod` marker in any cgroup path segment.
fn pod_uids(cgroup: &str) -> impl Iterator<Item = String> + '_ {
    cgroup
        .lines()
        .filter_map(|line| line.splitn(3, ':').nth(2))
        .flat_map(|path| path.split('/'))
        .filter_map(segment_uid)
}

fn segment_uid(segment: &str) -> Option<String> {
    let segment = segment
        .strip_suffix(SYSTEMD_SLICE_SUFFIX)
        .unwrap_or(segment);
    segment
        .match_indices(POD_CGROUP_MARKER)
        // The marker starts the segment or follows a dash; this skips the
        // `pod` inside `kubepods`.
        .filter(|&(at, _)| at == 0 || segment[..at].ends_with('-'))
        .map(|(at, _)| &segment[at + POD_CGROUP_MARKER.len()..])
        .find(|candidate| !candidate.is_empty() && candidate.chars().all(is_uid_char))
        .map(normalize)
}
