//! Node configuration model.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{MeshError, Result};

/// Root configuration for a meshnode agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory holding the host's process state.
    ///
    /// An empty string selects the embedded snapshot instead of a live view.
    pub proc_root: String,
    /// Priority assigned to installed TC filters.
    pub filter_priority: u16,
    /// Handle assigned to installed TC filters.
    pub filter_handle: u32,
    /// Name recorded on installed TC filters.
    pub filter_name: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            proc_root: constants::DEFAULT_PROC_ROOT.to_owned(),
            filter_priority: constants::DEFAULT_FILTER_PRIORITY,
            filter_handle: constants::DEFAULT_FILTER_HANDLE,
            filter_name: constants::DEFAULT_FILTER_NAME.to_owned(),
        }
    }
}

impl NodeConfig {
    /// Loads a JSON configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails [`NodeConfig::validate`].
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| MeshError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| MeshError::Config {
            message: format!("{}: {e}", path.display()),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the values that the kernel would otherwise reject.
    ///
    /// # Errors
    ///
    /// Returns an error if the filter priority or handle is zero, or the
    /// filter name is empty.
    pub fn validate(&self) -> Result<()> {
        if self.filter_priority == 0 {
            return Err(MeshError::Config {
                message: "filter_priority must be non-zero".into(),
            });
        }
        if self.filter_handle == 0 {
            return Err(MeshError::Config {
                message: "filter_handle must be non-zero".into(),
            });
        }
        if self.filter_name.is_empty() {
            return Err(MeshError::Config {
                message: "filter_name must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Returns the directory label used when building namespace paths.
    ///
    /// Falls back to [`constants::DEFAULT_PROC_ROOT`] when the embedded
    /// snapshot is selected.
    #[must_use]
    pub fn proc_label(&self) -> PathBuf {
        if self.proc_root.is_empty() {
            PathBuf::from(constants::DEFAULT_PROC_ROOT)
        } else {
            PathBuf::from(&self.proc_root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_host_proc() {
        let config = NodeConfig::default();
        assert_eq!(config.proc_root, "/host/proc");
        assert_eq!(config.filter_priority, 1);
        assert_eq!(config.filter_handle, 1);
    }

    #[test]
    fn empty_proc_root_uses_default_label() {
        let config = NodeConfig {
            proc_root: String::new(),
            ..NodeConfig::default()
        };
        assert_eq!(config.proc_label(), PathBuf::from("/host/proc"));
    }

    #[test]
    fn from_file_fills_missing_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("node.json");
        std::fs::write(&path, r#"{ "proc_root": "/tmp/proc" }"#).expect("write");
        let config = NodeConfig::from_file(&path).expect("load");
        assert_eq!(config.proc_root, "/tmp/proc");
        assert_eq!(config.filter_name, "meshnode_tc");
    }

    #[test]
    fn from_file_rejects_zero_priority() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("node.json");
        std::fs::write(&path, r#"{ "filter_priority": 0 }"#).expect("write");
        let err = NodeConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, MeshError::Config { .. }));
    }

    #[test]
    fn from_file_rejects_malformed_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("node.json");
        std::fs::write(&path, "{ not json").expect("write");
        assert!(NodeConfig::from_file(&path).is_err());
    }

    #[test]
    fn from_file_missing_file_is_io_error() {
        let err = NodeConfig::from_file(Path::new("/nonexistent/node.json")).unwrap_err();
        assert!(matches!(err, MeshError::Io { .. }));
    }
}
