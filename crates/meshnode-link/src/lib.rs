//! # meshnode-link
//!
//! Device resolution and traffic-control attachment for workload links.
//!
//! - **Links**: the [`Link`](link::Link) capability and the OS interface
//!   table.
//! - **Link control**: the [`LinkControl`](control::LinkControl) capability
//!   (link kind queries, clsact qdiscs, eBPF filters) and its rtnetlink
//!   implementation.
//! - **Device resolver**: veth peer lookup and address membership.
//! - **TC manager**: idempotent attach/detach of a program descriptor on
//!   both clsact hooks.
//!
//! The `ebpf` feature accepts programs loaded with `aya` directly.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod control;
pub mod device;
pub mod interfaces;
pub mod link;
#[cfg(target_os = "linux")]
pub mod netlink;
pub mod tc;

#[cfg(any(test, feature = "testing"))]
pub mod fixture;

pub use control::{FilterSpec, LinkControl, LinkInfo};
pub use device::{DeviceResolver, iface_contains_any_ip};
pub use interfaces::{InterfaceTable, SystemInterfaces};
pub use link::{InterfaceAddress, InterfaceFlags, Link, LinkRef, NetworkInterface};
pub use tc::TcManager;
#[cfg(target_os = "linux")]
pub use netlink::RtnlLinkControl;
