//! OS interface table.
//!
//! The table reflects the network namespace of the calling thread at the
//! time of the call.

use std::net::{IpAddr, SocketAddrV4, SocketAddrV6};
use std::path::PathBuf;

use meshnode_common::error::{MeshError, Result};
use nix::sys::socket::SockaddrStorage;

use crate::link::{InterfaceAddress, NetworkInterface};

/// Lookup of network interfaces by name or index.
pub trait InterfaceTable {
    /// Lists all interfaces ordered by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the interface table cannot be read.
    fn list(&self) -> Result<Vec<NetworkInterface>>;

    /// Finds an interface by name.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InterfaceNotFound`] for an empty or unknown name.
    fn by_name(&self, name: &str) -> Result<NetworkInterface> {
        if name.is_empty() {
            return Err(MeshError::InterfaceNotFound { name: String::new() });
        }
        self.list()?
            .into_iter()
            .find(|iface| iface.name == name)
            .ok_or_else(|| MeshError::InterfaceNotFound {
                name: name.to_owned(),
            })
    }

    /// Finds an interface by index.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::InterfaceNotFound`] if no interface has `index`.
    fn by_index(&self, index: u32) -> Result<NetworkInterface> {
        self.list()?
            .into_iter()
            .find(|iface| iface.index == index)
            .ok_or_else(|| MeshError::InterfaceNotFound {
                name: format!("#{index}"),
            })
    }
}

/// Interface table read with `getifaddrs(3)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

fn ip_of(addr: &SockaddrStorage) -> Option<IpAddr> {
    if let Some(v4) = addr.as_sockaddr_in() {
        return Some(IpAddr::V4(*SocketAddrV4::from(*v4).ip()));
    }
    addr.as_sockaddr_in6()
        .map(|v6| IpAddr::V6(*SocketAddrV6::from(*v6).ip()))
}

fn prefix_len(ip: IpAddr, netmask: Option<IpAddr>) -> u8 {
    let ones = match (ip, netmask) {
        (IpAddr::V4(_), Some(IpAddr::V4(mask))) => u32::from(mask).count_ones(),
        (IpAddr::V6(_), Some(IpAddr::V6(mask))) => u128::from(mask).count_ones(),
        (IpAddr::V4(_), _) => 32,
        (IpAddr::V6(_), _) => 128,
    };
    u8::try_from(ones).unwrap_or(u8::MAX)
}

impl InterfaceTable for SystemInterfaces {
    fn list(&self) -> Result<Vec<NetworkInterface>> {
        let addrs = nix::ifaddrs::getifaddrs().map_err(|e| MeshError::Io {
            path: PathBuf::from("getifaddrs"),
            source: e.into(),
        })?;

        let mut found: Vec<NetworkInterface> = Vec::new();
        for ifa in addrs {
            let pos = if let Some(pos) = found.iter().position(|i| i.name == ifa.interface_name) {
                pos
            } else {
                // The interface may vanish between the two calls.
                let Ok(index) = nix::net::if_::if_nametoindex(ifa.interface_name.as_str()) else {
                    continue;
                };
                found.push(NetworkInterface::new(ifa.interface_name.clone(), index, ifa.flags));
                found.len() - 1
            };
            let iface = &mut found[pos];
            iface.flags |= ifa.flags;

            if let Some(ip) = ifa.address.as_ref().and_then(ip_of) {
                let mask = ifa.netmask.as_ref().and_then(ip_of);
                iface.addresses.push(InterfaceAddress {
                    ip,
                    prefix_len: prefix_len(ip, mask),
                });
            }
        }
        found.sort_by_key(|iface| iface.index);
        Ok(found)
    }
}
