//! Archive extraction for downloaded distributions.

mod extract;
mod path;
mod tar_gz;
mod zip_ops;

use std::path::Path;

use crate::error::{NeoError, Result};

pub(crate) use tar_gz::extract_tar_gz;
pub(crate) use zip_ops::extract_zip;

/// Unpack an archive into `dest_dir`, selecting the extractor by extension.
pub(crate) fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    if name.ends_with(".zip") {
        extract_zip(archive_path, dest_dir)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive_path, dest_dir)
    } else {
        Err(NeoError::extraction(format!(
            "unsupported archive format: {name:?}"
        )))
    }
}
