//! Veth peer resolution and address membership.

use std::net::IpAddr;

use meshnode_common::constants::VETH_KIND;
use meshnode_common::error::{MeshError, Result};

use crate::control::LinkControl;
use crate::interfaces::InterfaceTable;
use crate::link::NetworkInterface;

/// Inspects interfaces and resolves the host side of veth pairs.
///
/// Both collaborators are queried on every call; nothing is cached.
#[derive(Debug, Clone)]
pub struct DeviceResolver<C, T> {
    control: C,
    interfaces: T,
}

#[cfg(target_os = "linux")]
impl DeviceResolver<crate::netlink::RtnlLinkControl, crate::interfaces::SystemInterfaces> {
    /// Resolver backed by rtnetlink and `getifaddrs(3)`.
    #[must_use]
    pub const fn system() -> Self {
        Self::new(
            crate::netlink::RtnlLinkControl,
            crate::interfaces::SystemInterfaces,
        )
    }
}

impl<C: LinkControl, T: InterfaceTable> DeviceResolver<C, T> {
    /// Creates a resolver over the given link control and interface table.
    #[must_use]
    pub const fn new(control: C, interfaces: T) -> Self {
        Self {
            control,
            interfaces,
        }
    }

    /// Link control used for kind queries.
    pub const fn control(&self) -> &C {
        &self.control
    }

    /// Interface table used for name lookups.
    pub const fn interfaces(&self) -> &T {
        &self.interfaces
    }

    /// Returns the index of the device paired with `iface`.
    ///
    /// # Errors
    ///
    /// - [`MeshError::NotUp`] if the interface is administratively down.
    /// - [`MeshError::LocalInterface`] if it is a loopback device.
    /// - [`MeshError::LinkLookup`] if the kind query fails or a veth link
    ///   reports no peer.
    /// - [`MeshError::NotVeth`] for any other link kind.
    pub fn veth_peer_index(&self, iface: &NetworkInterface) -> Result<u32> {
        if !iface.is_up() {
            return Err(MeshError::NotUp {
                iface: iface.name.clone(),
            });
        }
        if iface.is_loopback() {
            return Err(MeshError::LocalInterface {
                iface: iface.name.clone(),
            });
        }

        let info = self
            .control
            .link_info(iface.index)
            .map_err(|source| MeshError::LinkLookup {
                iface: iface.name.clone(),
                source,
            })?;

        match (info.kind.as_deref(), info.peer_index) {
            (Some(VETH_KIND), Some(peer)) => {
                tracing::debug!(iface = %iface.name, peer, "resolved veth peer");
                Ok(peer)
            }
            (Some(VETH_KIND), None) => Err(MeshError::LinkLookup {
                iface: iface.name.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "veth link reports no peer index",
                ),
            }),
            (kind, _) => Err(MeshError::NotVeth {
                iface: iface.name.clone(),
                kind: kind.unwrap_or("none").to_owned(),
            }),
        }
    }

    /// Looks `name` up in the interface table, then resolves its peer.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InterfaceNotFound`] for an empty or unknown name,
    /// otherwise the errors of [`Self::veth_peer_index`].
    pub fn veth_peer_index_by_name(&self, name: &str) -> Result<u32> {
        let iface = self.interfaces.by_name(name)?;
        self.veth_peer_index(&iface)
    }

    /// First interface (by index) bound to any of `candidates`.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface table cannot be read.
    pub fn find_by_ips<S: AsRef<str>>(&self, candidates: &[S]) -> Result<Option<NetworkInterface>> {
        Ok(self
            .interfaces
            .list()?
            .into_iter()
            .find(|iface| iface_contains_any_ip(iface, candidates)))
    }
}

/// Whether any candidate parses to an address bound on `iface`.
///
/// Prefix lengths are ignored. Unparseable candidates never match.
#[must_use]
pub fn iface_contains_any_ip<S: AsRef<str>>(iface: &NetworkInterface, candidates: &[S]) -> bool {
    candidates
        .iter()
        .filter_map(|c| c.as_ref().parse::<IpAddr>().ok())
        .map(|ip| ip.to_canonical())
        .any(|ip| {
            iface
                .addresses
                .iter()
                .any(|bound| bound.ip.to_canonical() == ip)
        })
}
