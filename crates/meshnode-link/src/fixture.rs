//! In-memory link control and interface table for tests.
//!
//! [`MemoryLinkControl`] mimics the kernel rules the TC manager relies on:
//! unknown links fail with `ENODEV`, filters need a clsact qdisc
//! (`EINVAL` otherwise), and deleting an absent filter fails with `ENOENT`.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::sync::{Mutex, PoisonError};

use meshnode_common::error::Result;
use meshnode_common::types::TcDirection;

use crate::control::{FilterSpec, LinkControl, LinkInfo};
use crate::interfaces::InterfaceTable;
use crate::link::NetworkInterface;

/// A filter as recorded by [`MemoryLinkControl`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledFilter {
    /// Filter identity.
    pub filter: FilterSpec,
    /// Program descriptor the filter was installed with.
    pub prog_fd: RawFd,
}

#[derive(Debug, Default)]
struct State {
    links: BTreeMap<u32, LinkInfo>,
    clsact: BTreeSet<u32>,
    qdisc_creations: usize,
    filters: BTreeMap<(u32, TcDirection, u16, u32), InstalledFilter>,
    calls: Vec<String>,
    fail_with: Option<i32>,
}

/// Link control that keeps qdiscs and filters in memory.
#[derive(Debug, Default)]
pub struct MemoryLinkControl {
    state: Mutex<State>,
}

impl MemoryLinkControl {
    /// Control with no links.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a link of `kind` without a peer.
    #[must_use]
    pub fn with_link(self, index: u32, kind: Option<&str>) -> Self {
        let _ = self.lock().links.insert(
            index,
            LinkInfo {
                kind: kind.map(str::to_owned),
                peer_index: None,
            },
        );
        self
    }

    /// Adds a veth link whose peer has index `peer`.
    #[must_use]
    pub fn with_veth(self, index: u32, peer: u32) -> Self {
        let _ = self.lock().links.insert(
            index,
            LinkInfo {
                kind: Some("veth".into()),
                peer_index: Some(peer),
            },
        );
        self
    }

    /// Makes every operation fail with `errno`.
    #[must_use]
    pub fn failing(self, errno: i32) -> Self {
        self.lock().fail_with = Some(errno);
        self
    }

    /// Whether a clsact qdisc exists on `index`.
    pub fn has_clsact(&self, index: u32) -> bool {
        self.lock().clsact.contains(&index)
    }

    /// Number of clsact qdiscs currently present.
    pub fn qdisc_count(&self) -> usize {
        self.lock().clsact.len()
    }

    /// Number of times a qdisc was created rather than replaced.
    pub fn qdisc_creations(&self) -> usize {
        self.lock().qdisc_creations
    }

    /// Filters on one hook of `index`.
    pub fn filters(&self, index: u32, direction: TcDirection) -> Vec<InstalledFilter> {
        self.lock()
            .filters
            .iter()
            .filter(|((i, d, _, _), _)| *i == index && *d == direction)
            .map(|(_, f)| f.clone())
            .collect()
    }

    /// Total number of installed filters.
    pub fn filter_count(&self) -> usize {
        self.lock().filters.len()
    }

    /// Operations received so far, e.g. `replace_filter 3 ingress`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl State {
    fn enter(&mut self, call: String, index: u32) -> io::Result<()> {
        self.calls.push(call);
        if let Some(errno) = self.fail_with {
            return Err(io::Error::from_raw_os_error(errno));
        }
        if !self.links.contains_key(&index) {
            return Err(io::Error::from_raw_os_error(libc::ENODEV));
        }
        Ok(())
    }

    fn require_clsact(&self, index: u32) -> io::Result<()> {
        if self.clsact.contains(&index) {
            Ok(())
        } else {
            Err(io::Error::from_raw_os_error(libc::EINVAL))
        }
    }
}

impl LinkControl for MemoryLinkControl {
    fn link_info(&self, index: u32) -> io::Result<LinkInfo> {
        let mut state = self.lock();
        state.enter(format!("link_info {index}"), index)?;
        Ok(state.links.get(&index).cloned().unwrap_or_default())
    }

    fn replace_clsact(&self, index: u32) -> io::Result<()> {
        let mut state = self.lock();
        state.enter(format!("replace_clsact {index}"), index)?;
        if state.clsact.insert(index) {
            state.qdisc_creations += 1;
        }
        Ok(())
    }

    fn replace_filter(&self, index: u32, filter: &FilterSpec, prog_fd: BorrowedFd<'_>) -> io::Result<()> {
        let mut state = self.lock();
        state.enter(format!("replace_filter {index} {}", filter.direction), index)?;
        state.require_clsact(index)?;
        let key = (index, filter.direction, filter.priority, filter.handle);
        let _ = state.filters.insert(
            key,
            InstalledFilter {
                filter: filter.clone(),
                prog_fd: prog_fd.as_raw_fd(),
            },
        );
        Ok(())
    }

    fn delete_filter(&self, index: u32, filter: &FilterSpec) -> io::Result<()> {
        let mut state = self.lock();
        state.enter(format!("delete_filter {index} {}", filter.direction), index)?;
        state.require_clsact(index)?;
        let key = (index, filter.direction, filter.priority, filter.handle);
        state
            .filters
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))
    }
}

/// Fixed interface table.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces {
    interfaces: Vec<NetworkInterface>,
}

impl StaticInterfaces {
    /// Table listing `interfaces`.
    #[must_use]
    pub fn new(mut interfaces: Vec<NetworkInterface>) -> Self {
        interfaces.sort_by_key(|iface| iface.index);
        Self { interfaces }
    }
}

impl InterfaceTable for StaticInterfaces {
    fn list(&self) -> Result<Vec<NetworkInterface>> {
        Ok(self.interfaces.clone())
    }
}
