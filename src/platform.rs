use std::env::consts::OS;

use crate::error::{NeoError, Result};

const ARTIFACT_URL_BASE: &str = "https://neo4j.com/artifact.php?name=";

/// Directory name of an unpacked distribution, shared by the archive's
/// top-level directory and the cache layout.
pub fn dist_dir_name(version: &str) -> String {
    format!("neo4j-community-{version}")
}

/// Archive file name for this platform: Windows ships a zip, everything
/// else a gzipped tarball.
pub fn archive_file_name(version: &str) -> String {
    if OS == "windows" {
        format!("neo4j-community-{version}-windows.zip")
    } else {
        format!("neo4j-community-{version}-unix.tar.gz")
    }
}

/// Download URL for the distribution archive of a version.
pub fn artifact_url(version: &str) -> String {
    format!("{ARTIFACT_URL_BASE}{}", archive_file_name(version))
}

/// Reject version strings that could escape the cache directory or smuggle
/// shell metacharacters into an URL.
pub fn validate_version_tag(version: &str) -> Result<()> {
    let is_safe = !version.is_empty()
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));

    if !is_safe {
        return Err(NeoError::download(format!(
            "invalid version string: {version:?}"
        )));
    }

    Ok(())
}
