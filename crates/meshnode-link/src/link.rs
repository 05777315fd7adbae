//! Network link capability and interface snapshots.

use std::fmt;
use std::net::IpAddr;

pub use nix::net::if_::InterfaceFlags;

/// Attributes every link exposes, whether kernel-backed or synthetic.
pub trait Link {
    /// Kernel interface index.
    fn index(&self) -> u32;
    /// Interface name.
    fn name(&self) -> &str;
}

/// A bare link reference: name and index only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkRef {
    name: String,
    index: u32,
}

impl LinkRef {
    /// Creates a link reference.
    #[must_use]
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }
}

impl Link for LinkRef {
    fn index(&self) -> u32 {
        self.index
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// An address bound to an interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InterfaceAddress {
    /// Address portion.
    pub ip: IpAddr,
    /// Prefix length of the bound network.
    pub prefix_len: u8,
}

impl fmt::Display for InterfaceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_len)
    }
}

/// Point-in-time view of an OS network interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInterface {
    /// Interface name.
    pub name: String,
    /// Kernel interface index.
    pub index: u32,
    /// Interface flags (`IFF_UP`, `IFF_LOOPBACK`, ...).
    pub flags: InterfaceFlags,
    /// Bound addresses.
    pub addresses: Vec<InterfaceAddress>,
}

impl NetworkInterface {
    /// Creates an interface with no addresses.
    #[must_use]
    pub fn new(name: impl Into<String>, index: u32, flags: InterfaceFlags) -> Self {
        Self {
            name: name.into(),
            index,
            flags,
            addresses: Vec::new(),
        }
    }

    /// Adds a bound address.
    #[must_use]
    pub fn with_address(mut self, ip: IpAddr, prefix_len: u8) -> Self {
        self.addresses.push(InterfaceAddress { ip, prefix_len });
        self
    }

    /// Whether the administrative-up flag is set.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_UP)
    }

    /// Whether the interface is a loopback device.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        self.flags.contains(InterfaceFlags::IFF_LOOPBACK)
    }
}

impl Link for NetworkInterface {
    fn index(&self) -> u32 {
        self.index
    }

    fn name(&self) -> &str {
        &self.name
    }
}
