//! Running work inside another network namespace.
//!
//! `setns(2)` switches only the calling thread, so [`SetnsEntry`] runs the
//! closure on a dedicated thread that enters the namespace and then exits.
//! The caller's thread never changes namespace.

use meshnode_common::error::Result;
use meshnode_common::types::NamespacePath;

/// Capability to execute a closure inside a network namespace.
pub trait NamespaceEntry {
    /// Runs `f` inside `path` and returns its result. The caller's
    /// namespace is the same afterwards, even if `f` fails or panics.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or an error if the namespace cannot be
    /// entered.
    fn run_in<T, F>(&self, path: &NamespacePath, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send;
}

/// Enters namespaces with `setns(2)` on a scoped worker thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetnsEntry;

#[cfg(target_os = "linux")]
impl NamespaceEntry for SetnsEntry {
    fn run_in<T, F>(&self, path: &NamespacePath, f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        use std::os::fd::AsFd;

        use meshnode_common::error::MeshError;
        use nix::sched::{CloneFlags, setns};

        let entry_err = |source: std::io::Error| MeshError::NamespaceEntry {
            path: path.as_str().to_owned(),
            source,
        };
        let target = std::fs::File::open(path.as_str()).map_err(entry_err)?;

        let joined = std::thread::scope(|scope| {
            scope
                .spawn(move || {
                    setns(target.as_fd(), CloneFlags::CLONE_NEWNET)
                        .map_err(|e| entry_err(e.into()))?;
                    tracing::debug!(path = %path, "entered network namespace");
                    f()
                })
                .join()
        });
        // The worker thread exits with the namespace it entered; only a
        // panic has to be carried back to the caller.
        joined.unwrap_or_else(|payload| std::panic::resume_unwind(payload))
    }
}

/// Stub for non-Linux platforms.
#[cfg(not(target_os = "linux"))]
impl NamespaceEntry for SetnsEntry {
    fn run_in<T, F>(&self, _path: &NamespacePath, _f: F) -> Result<T>
    where
        T: Send,
        F: FnOnce() -> Result<T> + Send,
    {
        Err(meshnode_common::error::MeshError::Config {
            message: "Linux required for network namespace entry".into(),
        })
    }
}
