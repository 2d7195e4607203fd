use std::fs;
use std::path::Path;

use crate::error::{NeoError, Result};

use super::extract::write_entry;
use super::path::parse_entry_rel_path;

/// Extract a zip archive into `dest_dir`.
pub(crate) fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir).map_err(|e| NeoError::io(e.to_string()))?;
    let file = fs::File::open(archive_path).map_err(|e| NeoError::io(e.to_string()))?;
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;

        let raw_name = entry.name().to_string();
        let Some(relative) = parse_entry_rel_path(&raw_name) else {
            return Err(NeoError::extraction(format!(
                "archive contains unsafe zip path: {raw_name:?}"
            )));
        };
        let out_path = dest_dir.join(relative);

        if entry.is_symlink() {
            return Err(NeoError::extraction(format!(
                "unexpected symlink entry in zip archive: {raw_name:?}"
            )));
        }

        let is_dir = entry.is_dir();
        let unix_mode = entry.unix_mode();
        write_entry(&out_path, is_dir, &mut entry, unix_mode)?;
    }

    Ok(())
}
