//! Attach and detach of TC programs for a workload.

use std::os::fd::BorrowedFd;

use meshnode_common::error::{MeshError, Result};
use meshnode_common::types::WorkloadUid;
use meshnode_link::{DeviceResolver, InterfaceTable, LinkControl, LinkRef, TcManager};
use meshnode_netns::{CgroupMatcher, NamespaceEntry, NamespaceResolver, ProcFs};

/// Attacher wired to the live system: process state from the configured
/// proc root, rtnetlink, `getifaddrs(3)` and `setns(2)`.
#[cfg(target_os = "linux")]
pub type SystemAttacher = WorkloadAttacher<
    meshnode_netns::ProcRoot,
    meshnode_netns::KubepodsMatcher,
    meshnode_link::RtnlLinkControl,
    meshnode_link::SystemInterfaces,
    meshnode_link::RtnlLinkControl,
    meshnode_netns::SetnsEntry,
>;

#[cfg(target_os = "linux")]
impl SystemAttacher {
    /// Builds the live attacher from node configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn system(config: &meshnode_common::config::NodeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            NamespaceResolver::from_config(config),
            DeviceResolver::system(),
            TcManager::from_config(meshnode_link::RtnlLinkControl, config),
            meshnode_netns::SetnsEntry,
        ))
    }
}

/// Runs the workload pipeline across namespace and link layers.
///
/// Device lookups (`C`, `T`) run inside the workload's namespace, on the
/// thread the entry capability provides. TC operations (`H`) run on the
/// caller's thread and namespace.
#[derive(Debug)]
pub struct WorkloadAttacher<P, M, C, T, H, E> {
    namespaces: NamespaceResolver<P, M>,
    devices: DeviceResolver<C, T>,
    tc: TcManager<H>,
    entry: E,
}

impl<P, M, C, T, H, E> WorkloadAttacher<P, M, C, T, H, E>
where
    P: ProcFs,
    M: CgroupMatcher,
    C: LinkControl + Sync,
    T: InterfaceTable + Sync,
    H: LinkControl,
    E: NamespaceEntry,
{
    /// Assembles an attacher from its parts.
    pub const fn new(
        namespaces: NamespaceResolver<P, M>,
        devices: DeviceResolver<C, T>,
        tc: TcManager<H>,
        entry: E,
    ) -> Self {
        Self {
            namespaces,
            devices,
            tc,
            entry,
        }
    }

    /// Namespace resolver.
    pub const fn namespaces(&self) -> &NamespaceResolver<P, M> {
        &self.namespaces
    }

    /// Device resolver used inside workload namespaces.
    pub const fn devices(&self) -> &DeviceResolver<C, T> {
        &self.devices
    }

    /// TC manager used on host links.
    pub const fn tc(&self) -> &TcManager<H> {
        &self.tc
    }

    /// Index of the host link paired with the workload interface that
    /// carries one of `pod_ips`.
    ///
    /// # Errors
    ///
    /// Returns [`MeshError::NamespaceNotFound`] if no process belongs to the
    /// workload, [`MeshError::InterfaceNotFound`] if no interface in its
    /// namespace holds one of `pod_ips`, and the device resolver's errors
    /// otherwise.
    pub fn host_index<S: AsRef<str> + Sync>(&self, uid: &WorkloadUid, pod_ips: &[S]) -> Result<u32> {
        let path = self.namespaces.pod_namespace_path(uid)?;
        let devices = &self.devices;
        let peer = self.entry.run_in(&path, || {
            let iface = devices
                .find_by_ips(pod_ips)?
                .ok_or_else(|| MeshError::InterfaceNotFound {
                    name: joined(pod_ips),
                })?;
            tracing::debug!(uid = %uid, iface = %iface.name, "workload interface found");
            devices.veth_peer_index(&iface)
        })?;
        tracing::debug!(uid = %uid, netns = %path, host_index = peer, "resolved host link");
        Ok(peer)
    }

    /// Resolves the workload's host link and attaches `prog_fd` to it.
    ///
    /// Returns the host link index so that callers can detach later without
    /// resolving again.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::host_index`] and
    /// [`TcManager::attach`].
    pub fn attach<S: AsRef<str> + Sync>(
        &self,
        uid: &WorkloadUid,
        pod_ips: &[S],
        prog_fd: BorrowedFd<'_>,
    ) -> Result<u32> {
        let index = self.host_index(uid, pod_ips)?;
        self.tc.attach(&self.host_link(index), prog_fd)?;
        tracing::info!(uid = %uid, host_index = index, "workload attached");
        Ok(index)
    }

    /// Resolves the workload's host link again and detaches from it.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Self::host_index`] and
    /// [`TcManager::detach`].
    pub fn detach<S: AsRef<str> + Sync>(&self, uid: &WorkloadUid, pod_ips: &[S]) -> Result<u32> {
        let index = self.host_index(uid, pod_ips)?;
        self.detach_index(index)?;
        tracing::info!(uid = %uid, host_index = index, "workload detached");
        Ok(index)
    }

    /// Detaches from a host link index returned by an earlier attach.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`TcManager::detach`].
    pub fn detach_index(&self, index: u32) -> Result<()> {
        self.tc.detach(&self.host_link(index))
    }

    fn host_link(&self, index: u32) -> LinkRef {
        let name = self
            .devices
            .interfaces()
            .by_index(index)
            .map_or_else(|_| format!("#{index}"), |iface| iface.name);
        LinkRef::new(name, index)
    }
}

fn joined<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsFd;
    use std::sync::Mutex;

    use meshnode_common::types::{NamespacePath, TcDirection};
    use meshnode_link::fixture::{MemoryLinkControl, StaticInterfaces};
    use meshnode_link::{InterfaceFlags, NetworkInterface};
    use meshnode_netns::ProcSnapshot;

    use super::*;

    /// Runs closures on the current thread and records the paths.
    #[derive(Debug, Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Recorder {
        fn paths(&self) -> Vec<String> {
            self.0.lock().expect("recorder lock").clone()
        }
    }

    impl NamespaceEntry for Recorder {
        fn run_in<R, F>(&self, path: &NamespacePath, f: F) -> Result<R>
        where
            R: Send,
            F: FnOnce() -> Result<R> + Send,
        {
            self.0.lock().expect("recorder lock").push(path.to_string());
            f()
        }
    }

    type TestAttacher =
        WorkloadAttacher<ProcSnapshot, meshnode_netns::KubepodsMatcher, MemoryLinkControl, StaticInterfaces, MemoryLinkControl, Recorder>;

    fn attacher() -> TestAttacher {
        let proc = ProcSnapshot::new().with_process(
            "1234",
            4_026_532_001,
            "0::/kubepods/besteffort/pod123-456-789/abc\n",
        );
        let eth0 = NetworkInterface::new("eth0", 3, InterfaceFlags::IFF_UP)
            .with_address("10.244.1.7".parse().expect("ip"), 24);
        WorkloadAttacher::new(
            NamespaceResolver::new(proc, "/host/proc"),
            DeviceResolver::new(
                MemoryLinkControl::new().with_veth(3, 11),
                StaticInterfaces::new(vec![eth0]),
            ),
            TcManager::new(MemoryLinkControl::new().with_link(11, Some("veth"))),
            Recorder::default(),
        )
    }

    #[test]
    fn attach_targets_host_peer() {
        let prog = tempfile::tempfile().expect("tempfile");
        let a = attacher();
        let index = a
            .attach(&WorkloadUid::new("123-456-789"), &["10.244.1.7"], prog.as_fd())
            .expect("attach");
        assert_eq!(index, 11);
        assert_eq!(a.entry.paths(), ["/host/proc/1234/ns/net"]);
        for direction in TcDirection::ALL {
            assert_eq!(a.tc().control().filters(11, direction).len(), 1);
        }
    }

    #[test]
    fn unknown_workload_never_enters_a_namespace() {
        let prog = tempfile::tempfile().expect("tempfile");
        let a = attacher();
        let err = a
            .attach(&WorkloadUid::new("000-000-000"), &["10.244.1.7"], prog.as_fd())
            .unwrap_err();
        assert!(matches!(err, MeshError::NamespaceNotFound { .. }));
        assert!(a.entry.paths().is_empty());
        assert!(a.tc().control().calls().is_empty());
    }

    #[test]
    fn missing_pod_address_is_interface_not_found() {
        let a = attacher();
        let err = a
            .host_index(&WorkloadUid::new("123-456-789"), &["192.0.2.1", "bogus"])
            .unwrap_err();
        assert!(matches!(err, MeshError::InterfaceNotFound { ref name } if name == "192.0.2.1,bogus"));
    }

    #[test]
    fn detach_by_index_is_idempotent() {
        let a = attacher();
        a.detach_index(11).expect("detach");
        a.detach_index(11).expect("detach again");
        assert_eq!(a.tc().control().filter_count(), 0);
    }
}
