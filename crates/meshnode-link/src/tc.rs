//! Traffic-control attachment of eBPF programs.
//!
//! A clsact qdisc provides one ingress and one egress hook per link. The
//! manager installs a program on both hooks and removes it again, and every
//! operation can be repeated: qdiscs and filters are created with replace
//! semantics, and removing an absent filter is a success.
//!
//! No operation is retried here. Concurrent calls against the same link are
//! not serialized.

use std::io;
use std::os::fd::BorrowedFd;

use meshnode_common::config::NodeConfig;
use meshnode_common::constants::{
    DEFAULT_FILTER_HANDLE, DEFAULT_FILTER_NAME, DEFAULT_FILTER_PRIORITY,
};
use meshnode_common::error::{MeshError, Result};
use meshnode_common::types::{TcDirection, TcMode};

use crate::control::{FilterSpec, LinkControl};
use crate::link::Link;

/// Installs and removes program filters on clsact hooks.
#[derive(Debug, Clone)]
pub struct TcManager<C> {
    control: C,
    priority: u16,
    handle: u32,
    name: String,
}

impl<C: LinkControl> TcManager<C> {
    /// Manager using the default filter identity.
    pub fn new(control: C) -> Self {
        Self {
            control,
            priority: DEFAULT_FILTER_PRIORITY,
            handle: DEFAULT_FILTER_HANDLE,
            name: DEFAULT_FILTER_NAME.to_owned(),
        }
    }

    /// Manager using the filter identity from `config`.
    pub fn from_config(control: C, config: &NodeConfig) -> Self {
        Self {
            control,
            priority: config.filter_priority,
            handle: config.filter_handle,
            name: config.filter_name.clone(),
        }
    }

    /// Underlying link control.
    pub const fn control(&self) -> &C {
        &self.control
    }

    fn filter(&self, direction: TcDirection) -> FilterSpec {
        FilterSpec {
            direction,
            priority: self.priority,
            handle: self.handle,
            name: self.name.clone(),
        }
    }

    /// Creates the clsact qdisc on `link`, or replaces it in place.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::LinkOperation`] if the kernel rejects the request.
    pub fn ensure_qdisc<L: Link + ?Sized>(&self, link: &L) -> Result<()> {
        self.control
            .replace_clsact(link.index())
            .map_err(|source| link_error("replace qdisc", link, source))?;
        tracing::debug!(link = link.name(), index = link.index(), "clsact qdisc in place");
        Ok(())
    }

    /// Attaches or detaches `prog_fd` on both hooks of `link`.
    ///
    /// `mode` is the raw control-plane value: 1 attaches, 2 detaches.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InvalidMode`] for any other mode, before the
    /// kernel is contacted, and [`MeshError::LinkOperation`] if a qdisc or
    /// filter operation fails.
    pub fn manage_program<L: Link + ?Sized>(
        &self,
        link: &L,
        prog_fd: BorrowedFd<'_>,
        mode: i32,
    ) -> Result<()> {
        let mode = TcMode::try_from(mode)?;
        self.apply(link, prog_fd, mode)
    }

    /// Typed form of [`Self::manage_program`].
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::LinkOperation`] if a qdisc or filter operation
    /// fails.
    pub fn apply<L: Link + ?Sized>(&self, link: &L, prog_fd: BorrowedFd<'_>, mode: TcMode) -> Result<()> {
        match mode {
            TcMode::Attach => self.attach(link, prog_fd),
            TcMode::Detach => self.detach(link),
        }
    }

    /// Installs `prog_fd` on the ingress and egress hooks of `link`.
    ///
    /// A filter already present at the same priority and handle is
    /// replaced, whatever program it ran.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::LinkOperation`] if a qdisc or filter operation
    /// fails.
    pub fn attach<L: Link + ?Sized>(&self, link: &L, prog_fd: BorrowedFd<'_>) -> Result<()> {
        self.ensure_qdisc(link)?;
        for direction in TcDirection::ALL {
            self.control
                .replace_filter(link.index(), &self.filter(direction), prog_fd)
                .map_err(|source| link_error("replace filter", link, source))?;
        }
        tracing::info!(link = link.name(), index = link.index(), "tc program attached");
        Ok(())
    }

    /// Removes the program filters from both hooks of `link`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::LinkOperation`] if a qdisc or filter operation
    /// fails for any reason other than the filter being absent.
    pub fn detach<L: Link + ?Sized>(&self, link: &L) -> Result<()> {
        // Without the qdisc the kernel reports EINVAL rather than ENOENT.
        self.ensure_qdisc(link)?;
        for direction in TcDirection::ALL {
            match self
                .control
                .delete_filter(link.index(), &self.filter(direction))
            {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    tracing::debug!(link = link.name(), %direction, "filter already absent");
                }
                Err(source) => return Err(link_error("delete filter", link, source)),
            }
        }
        tracing::info!(link = link.name(), index = link.index(), "tc program detached");
        Ok(())
    }

    /// Attaches or detaches a classifier loaded with `aya`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InvalidMode`] for a mode other than 1 or 2,
    /// [`MeshError::LinkOperation`] if the program is not loaded or a qdisc
    /// or filter operation fails.
    #[cfg(all(feature = "ebpf", target_os = "linux"))]
    pub fn manage_classifier<L: Link + ?Sized>(
        &self,
        link: &L,
        program: &aya::programs::SchedClassifier,
        mode: i32,
    ) -> Result<()> {
        self.manage_loaded(link, mode, || {
            program.fd().map_err(|e| io::Error::other(e.to_string()))
        })
    }

    /// Checks `mode`, then takes the program descriptor from `load`.
    #[cfg(all(feature = "ebpf", target_os = "linux"))]
    fn manage_loaded<L, D, F>(&self, link: &L, mode: i32, load: F) -> Result<()>
    where
        L: Link + ?Sized,
        D: std::os::fd::AsFd,
        F: FnOnce() -> io::Result<D>,
    {
        let mode = TcMode::try_from(mode)?;
        let fd = load().map_err(|source| link_error("read program descriptor", link, source))?;
        self.apply(link, fd.as_fd(), mode)
    }
}

fn link_error<L: Link + ?Sized>(op: &'static str, link: &L, source: io::Error) -> MeshError {
    MeshError::LinkOperation {
        op,
        link: link.name().to_owned(),
        source,
    }
}
