//! Centralized path layout for the on-disk state.
//!
//! Everything lives under a single home root (by default `~/.neo-ondemand`):
//! - `versions/` — shared, unpacked server distributions, one per version
//! - `instance-data/<httpPort>/` — one private workspace per instance
//! - `temp/` — download and extraction staging
//!
//! All helpers take the home root explicitly so tests can point the whole
//! tree at a scratch directory.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{NeoError, Result};
use crate::platform::dist_dir_name;

/// Default home root for cached distributions and instance data.
#[allow(clippy::expect_used)]
pub fn default_home_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot find home directory");
    home.join(".neo-ondemand")
}

/// Shared directory of unpacked distributions.
pub fn versions_dir(home: &Path) -> PathBuf {
    home.join("versions")
}

/// Unpacked distribution for one version, e.g. `versions/neo4j-community-4.4.10`.
pub fn dist_dir(home: &Path, version: &str) -> PathBuf {
    versions_dir(home).join(dist_dir_name(version))
}

/// Download and extraction staging area.
pub fn temp_dir(home: &Path) -> PathBuf {
    home.join("temp")
}

/// Parent directory of all instance workspaces.
pub fn instance_data_dir(home: &Path) -> PathBuf {
    home.join("instance-data")
}

/// Workspace root for one instance, keyed by its http port.
pub fn instance_dir(home: &Path, http_port: u16) -> PathBuf {
    instance_data_dir(home).join(http_port.to_string())
}

/// Configuration directory inside an instance workspace.
pub fn instance_conf_dir(home: &Path, http_port: u16) -> PathBuf {
    instance_dir(home, http_port).join("conf")
}

/// The instance's private `neo4j.conf`.
pub fn instance_conf_path(home: &Path, http_port: u16) -> PathBuf {
    instance_conf_dir(home, http_port).join("neo4j.conf")
}

/// The instance's writable data subtree.
pub fn instance_store_dir(home: &Path, http_port: u16) -> PathBuf {
    instance_dir(home, http_port).join("data")
}

/// The server launch script inside an instance workspace.
pub fn server_bin_path(home: &Path, http_port: u16) -> PathBuf {
    let bin_dir = instance_dir(home, http_port).join("bin");

    #[cfg(target_os = "windows")]
    {
        bin_dir.join("neo4j.bat")
    }

    #[cfg(not(target_os = "windows"))]
    {
        bin_dir.join("neo4j")
    }
}

/// Ensure all required directories under the home root exist.
pub fn ensure_data_dirs(home: &Path) -> Result<()> {
    fs::create_dir_all(home).map_err(|e| NeoError::io(e.to_string()))?;

    let dirs = [
        versions_dir(home),
        instance_data_dir(home),
        temp_dir(home),
    ];
    for dir in &dirs {
        fs::create_dir_all(dir).map_err(|e| NeoError::io(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_keyed_by_http_port_and_version() {
        let home = Path::new("/tmp/neo-home");
        assert_eq!(
            dist_dir(home, "4.4.10"),
            Path::new("/tmp/neo-home/versions/neo4j-community-4.4.10")
        );
        assert_eq!(
            instance_dir(home, 7474),
            Path::new("/tmp/neo-home/instance-data/7474")
        );
        assert_eq!(
            instance_conf_path(home, 7474),
            Path::new("/tmp/neo-home/instance-data/7474/conf/neo4j.conf")
        );
        assert_eq!(
            instance_store_dir(home, 7474),
            Path::new("/tmp/neo-home/instance-data/7474/data")
        );
    }

    #[test]
    fn ensure_data_dirs_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("state");
        ensure_data_dirs(&home).unwrap();
        ensure_data_dirs(&home).unwrap();
        assert!(versions_dir(&home).is_dir());
        assert!(instance_data_dir(&home).is_dir());
        assert!(temp_dir(&home).is_dir());
    }
}
