//! Link-control capability.
//!
//! The kernel transport behind this trait is opaque to the resolvers and
//! the TC manager; [`RtnlLinkControl`](crate::netlink::RtnlLinkControl) is
//! the production implementation.

use std::io;
use std::os::fd::BorrowedFd;

use meshnode_common::types::TcDirection;

/// Kind-specific facts about a link.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkInfo {
    /// Link kind (`veth`, `bridge`, ...), if the kernel reports one.
    pub kind: Option<String>,
    /// Index of the paired device, for veth links.
    pub peer_index: Option<u32>,
}

/// Identity of an eBPF filter on one clsact hook.
///
/// Priority and handle stay fixed across calls so that a replace targets
/// the filter installed earlier instead of adding a second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterSpec {
    /// Hook the filter sits on.
    pub direction: TcDirection,
    /// Filter priority.
    pub priority: u16,
    /// Filter handle.
    pub handle: u32,
    /// Name recorded with the filter.
    pub name: String,
}

/// Kernel link operations consumed by this crate.
pub trait LinkControl: Send + Sync {
    /// Queries the kind and veth peer of the link with `index`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link does not exist or the query fails.
    fn link_info(&self, index: u32) -> io::Result<LinkInfo>;

    /// Creates or replaces the clsact qdisc on the link.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the request.
    fn replace_clsact(&self, index: u32) -> io::Result<()>;

    /// Creates or replaces a direct-action eBPF filter running `prog_fd`.
    ///
    /// # Errors
    ///
    /// Returns an error if the kernel rejects the request.
    fn replace_filter(&self, index: u32, filter: &FilterSpec, prog_fd: BorrowedFd<'_>) -> io::Result<()>;

    /// Deletes a filter. An absent filter yields [`io::ErrorKind::NotFound`].
    ///
    /// # Errors
    ///
    /// Returns an error if the filter is absent or the kernel rejects the
    /// request.
    fn delete_filter(&self, index: u32, filter: &FilterSpec) -> io::Result<()>;
}
