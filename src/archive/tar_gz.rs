use std::fs;
use std::path::Path;

use crate::error::{NeoError, Result};

use super::extract::write_entry;
use super::path::parse_entry_rel_path;

/// Extract a gzipped tarball into `dest_dir`, preserving entry modes.
///
/// Entry paths are validated before anything touches the filesystem; an
/// unsafe path aborts the whole extraction.
pub(crate) fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir).map_err(|e| NeoError::io(e.to_string()))?;
    let file = fs::File::open(archive_path).map_err(|error| NeoError::io(error.to_string()))?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);

    for entry in archive
        .entries()
        .map_err(|error| NeoError::extraction(error.to_string()))?
    {
        let mut entry = entry.map_err(|error| NeoError::extraction(error.to_string()))?;

        let raw_path = {
            let entry_path = entry
                .path()
                .map_err(|error| NeoError::extraction(error.to_string()))?;
            let s = entry_path.as_ref().to_str().ok_or_else(|| {
                NeoError::extraction(format!(
                    "archive entry path is not valid UTF-8: {entry_path:?}"
                ))
            })?;
            s.to_string()
        };

        let Some(relative) = parse_entry_rel_path(&raw_path) else {
            return Err(NeoError::extraction(format!(
                "archive contains unsafe entry path: {raw_path:?}"
            )));
        };
        let out_path = dest_dir.join(relative);

        let entry_type = entry.header().entry_type();
        match entry_type {
            tar::EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(|e| NeoError::extraction(e.to_string()))?
                    .ok_or_else(|| NeoError::extraction("symlink entry missing link target"))?;
                create_symlink_entry(&out_path, target.as_ref())?;
            }
            _ if entry_type.is_dir() || entry_type.is_file() => {
                let unix_mode = entry.header().mode().ok();
                write_entry(&out_path, entry_type.is_dir(), &mut entry, unix_mode)?;
            }
            _ => {
                return Err(NeoError::extraction(format!(
                    "unsupported tar entry type at {raw_path:?}: {entry_type:?}"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
fn create_symlink_entry(out_path: &Path, target: &Path) -> Result<()> {
    let target_str = target
        .to_str()
        .ok_or_else(|| NeoError::extraction("symlink target is not valid UTF-8"))?;
    if target.is_absolute() || parse_entry_rel_path(target_str).is_none() {
        return Err(NeoError::extraction(format!(
            "unsafe symlink target in archive: {target:?}"
        )));
    }

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NeoError::io(format!("failed to create directory {parent:?}: {e}")))?;
    }
    match fs::remove_file(out_path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(NeoError::io(e.to_string())),
    }
    std::os::unix::fs::symlink(target, out_path)
        .map_err(|e| NeoError::io(format!("failed to create symlink at {out_path:?}: {e}")))
}

#[cfg(not(unix))]
fn create_symlink_entry(out_path: &Path, _target: &Path) -> Result<()> {
    Err(NeoError::extraction(format!(
        "symlink entries are not supported on this platform: {out_path:?}"
    )))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt as _;

    fn build_tarball(dir: &Path, entries: &[(&str, &str, u32)]) -> std::path::PathBuf {
        let archive_path = dir.join("dist.tar.gz");
        let file = fs::File::create(&archive_path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for (path, contents, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(contents.len() as u64);
            header.set_mode(*mode);
            header.set_entry_type(tar::EntryType::Regular);
            // Write the entry name straight into the header field instead of via
            // `append_data`/`set_path`, which reject `..`. The traversal fixture below
            // needs an unsafe name on disk so the extractor's own guard can be exercised.
            let name_bytes = path.as_bytes();
            if let Some(gnu) = header.as_gnu_mut() {
                gnu.name[..name_bytes.len()].copy_from_slice(name_bytes);
            }
            header.set_cksum();
            builder.append(&header, contents.as_bytes()).unwrap();
        }

        builder.into_inner().unwrap().finish().unwrap().flush().unwrap();
        archive_path
    }

    #[test]
    fn extracts_files_with_modes() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build_tarball(
            tmp.path(),
            &[
                ("dist/conf/neo4j.conf", "dbms.mode=SINGLE\n", 0o644),
                ("dist/bin/neo4j", "#!/bin/sh\necho Started.\n", 0o755),
            ],
        );

        let dest = tmp.path().join("out");
        extract_tar_gz(&archive, &dest).unwrap();

        let conf = dest.join("dist/conf/neo4j.conf");
        assert_eq!(fs::read_to_string(&conf).unwrap(), "dbms.mode=SINGLE\n");

        let bin = dest.join("dist/bin/neo4j");
        let mode = fs::metadata(&bin).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "launch script should stay executable");
    }

    #[test]
    fn rejects_traversal_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = build_tarball(tmp.path(), &[("../evil.txt", "boom", 0o644)]);

        let dest = tmp.path().join("out");
        let err = extract_tar_gz(&archive, &dest).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Extraction);
        assert!(!tmp.path().join("evil.txt").exists());
    }
}
