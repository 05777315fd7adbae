//! Domain primitive types used across the meshnode workspace.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MeshError;

/// Opaque workload (pod) UID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadUid(String);

impl WorkloadUid {
    /// Creates a workload UID from a string value.
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns whether the UID is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for WorkloadUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location of a network namespace handle, e.g. `/host/proc/1234/ns/net`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespacePath(String);

impl NamespacePath {
    /// Wraps an already-formatted namespace path.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the path as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for NamespacePath {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Requested TC program operation.
///
/// The discriminants are the raw values used by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum TcMode {
    /// Install the program on both hooks.
    Attach = 1,
    /// Remove the program from both hooks.
    Detach = 2,
}

impl TryFrom<i32> for TcMode {
    type Error = MeshError;

    fn try_from(mode: i32) -> Result<Self, Self::Error> {
        match mode {
            1 => Ok(Self::Attach),
            2 => Ok(Self::Detach),
            _ => Err(MeshError::InvalidMode { mode }),
        }
    }
}

impl fmt::Display for TcMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attach => write!(f, "attach"),
            Self::Detach => write!(f, "detach"),
        }
    }
}

/// Hook point on a clsact qdisc.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TcDirection {
    /// Packets received by the link.
    Ingress,
    /// Packets transmitted by the link.
    Egress,
}

impl TcDirection {
    /// Both hook points, ingress first.
    pub const ALL: [Self; 2] = [Self::Ingress, Self::Egress];
}

impl fmt::Display for TcDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => write!(f, "ingress"),
            Self::Egress => write!(f, "egress"),
        }
    }
}
