//! # meshnode-agent
//!
//! Node-side workload pipeline. On workload add, the pod's network
//! namespace is located from process state, entered, and searched for the
//! interface carrying one of the pod's addresses. The index of its veth peer
//! names the host-side link, which receives the TC program on both hooks.
//! On removal the same resolution runs again, or a cached host index is
//! reused, and the program is detached.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod workload;

pub use workload::WorkloadAttacher;
