//! System-wide constants and default paths.

/// Default mount point of the host's `/proc` inside the agent container.
pub const DEFAULT_PROC_ROOT: &str = "/host/proc";

/// PID whose network namespace is the node's root namespace.
pub const HOST_INIT_PID: &str = "1";

/// Namespace handle below a process directory.
pub const NETNS_SUFFIX: &str = "ns/net";

/// Cgroup membership file below a process directory.
pub const CGROUP_FILE: &str = "cgroup";

/// Marker the kubelet places in front of the pod UID in cgroup paths.
pub const POD_CGROUP_MARKER: &str = "pod";

/// Suffix systemd appends to slice units in cgroup paths.
pub const SYSTEMD_SLICE_SUFFIX: &str = ".slice";

/// Link kind reported for virtual ethernet pairs.
pub const VETH_KIND: &str = "veth";

/// Queueing discipline that provides the ingress/egress hooks.
pub const CLSACT_KIND: &str = "clsact";

/// Classifier kind used for eBPF filters.
pub const BPF_FILTER_KIND: &str = "bpf";

/// Default TC filter priority.
pub const DEFAULT_FILTER_PRIORITY: u16 = 1;

/// Default TC filter handle.
pub const DEFAULT_FILTER_HANDLE: u32 = 1;

/// Default name recorded on installed filters.
pub const DEFAULT_FILTER_NAME: &str = "meshnode_tc";

/// Environment variable consulted by the CLI for the proc root.
pub const PROC_ROOT_ENV: &str = "MESHNODE_PROC_ROOT";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "meshctl";
