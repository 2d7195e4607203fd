//! Per-instance workspace staging and cleanup.
//!
//! Each instance gets a private copy of the distribution under
//! `instance-data/<httpPort>/`, so the shared cache entry stays read-only
//! and concurrently running instances never touch each other's files.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{NeoError, Result};
use crate::paths::{instance_dir, instance_store_dir};

/// Stage the workspace for an instance: create its directory tree and copy
/// the unpacked distribution into it. Re-staging over a previous workspace
/// overwrites files in place.
pub fn stage(home: &Path, http_port: u16, dist: &Path) -> Result<PathBuf> {
    let workspace = instance_dir(home, http_port);
    fs::create_dir_all(&workspace).map_err(|e| NeoError::io(e.to_string()))?;

    copy_tree(dist, &workspace)?;

    fs::create_dir_all(instance_store_dir(home, http_port))
        .map_err(|e| NeoError::io(e.to_string()))?;

    Ok(workspace)
}

/// Remove an instance workspace entirely. Purging a workspace that does not
/// exist is a no-op.
pub fn purge(home: &Path, http_port: u16) -> Result<()> {
    let workspace = instance_dir(home, http_port);
    match fs::remove_dir_all(&workspace) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(NeoError::io(format!(
            "failed to purge workspace {workspace:?}: {e}"
        ))),
    }
}

/// Recursively copy `src` into `dest`. `fs::copy` carries file permissions
/// on unix, keeping launch scripts executable; symlinks are recreated
/// rather than followed.
fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    for entry in WalkDir::new(src) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| NeoError::io(e.to_string()))?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(|e| NeoError::io(e.to_string()))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| NeoError::io(e.to_string()))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| {
                NeoError::io(format!("failed to copy {:?} to {target:?}: {e}", entry.path()))
            })?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, target: &Path) -> Result<()> {
    let link_target = fs::read_link(src).map_err(|e| NeoError::io(e.to_string()))?;
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| NeoError::io(e.to_string()))?;
    }
    match fs::remove_file(target) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(NeoError::io(e.to_string())),
    }
    std::os::unix::fs::symlink(&link_target, target)
        .map_err(|e| NeoError::io(format!("failed to create symlink at {target:?}: {e}")))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, target: &Path) -> Result<()> {
    fs::copy(src, target).map_err(|e| NeoError::io(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_dist(dir: &Path) -> PathBuf {
        let dist = dir.join("neo4j-community-0.0.0");
        fs::create_dir_all(dist.join("bin")).unwrap();
        fs::create_dir_all(dist.join("conf")).unwrap();
        fs::write(dist.join("bin/neo4j"), "#!/bin/sh\n").unwrap();
        fs::write(dist.join("conf/neo4j.conf"), "dbms.mode=SINGLE\n").unwrap();
        dist
    }

    #[test]
    fn stage_copies_distribution_and_creates_data_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path();
        let dist = fake_dist(home);

        let workspace = stage(home, 7474, &dist).unwrap();
        assert!(workspace.join("bin/neo4j").is_file());
        assert!(workspace.join("conf/neo4j.conf").is_file());
        assert!(workspace.join("data").is_dir());
        // The shared copy is untouched.
        assert!(dist.join("bin/neo4j").is_file());
    }

    #[test]
    fn staging_twice_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path();
        let dist = fake_dist(home);

        stage(home, 7474, &dist).unwrap();
        stage(home, 7474, &dist).unwrap();
        assert!(instance_dir(home, 7474).join("conf/neo4j.conf").is_file());
    }

    #[test]
    fn workspaces_are_isolated_per_port() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path();
        let dist = fake_dist(home);

        let a = stage(home, 7474, &dist).unwrap();
        let b = stage(home, 7475, &dist).unwrap();
        fs::write(a.join("conf/neo4j.conf"), "changed\n").unwrap();

        assert_eq!(
            fs::read_to_string(b.join("conf/neo4j.conf")).unwrap(),
            "dbms.mode=SINGLE\n"
        );
    }

    #[test]
    fn purge_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path();
        let dist = fake_dist(home);

        stage(home, 7474, &dist).unwrap();
        purge(home, 7474).unwrap();
        assert!(!instance_dir(home, 7474).exists());
        // Second purge of an absent workspace is not an error.
        purge(home, 7474).unwrap();
    }
}
