//! Version-keyed cache of unpacked server distributions.
//!
//! The cache hit path is a single directory existence check and performs no
//! network access. On miss the archive is downloaded into `temp/`, unpacked
//! into a private staging directory and renamed into `versions/` in one
//! step, so a half-extracted distribution is never visible to a concurrent
//! or later run.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt as _;
use reqwest::redirect::Policy;
use reqwest::Client;

use crate::archive::extract_archive;
use crate::error::{NeoError, Result};
use crate::paths::{dist_dir, temp_dir};
use crate::platform::{archive_file_name, artifact_url, dist_dir_name, validate_version_tag};

/// Upper bound on followed redirects while fetching an archive.
const MAX_REDIRECTS: usize = 10;

/// Timeout for establishing the artifact host connection. The transfer
/// itself is unbounded; distribution archives run into hundreds of MB.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Ensure the distribution for `version` is unpacked on disk and return its
/// location. Downloads and extracts only on a cache miss.
pub async fn ensure_dist(home: &Path, version: &str) -> Result<PathBuf> {
    validate_version_tag(version)?;

    let dist = dist_dir(home, version);
    if dist.exists() {
        return Ok(dist);
    }

    let archive_name = archive_file_name(version);
    let archive_path = temp_dir(home).join(&archive_name);
    let url = artifact_url(version);

    let client = Client::builder()
        .redirect(Policy::limited(MAX_REDIRECTS))
        .connect_timeout(CONNECT_TIMEOUT)
        .build()?;

    log::info!("Downloading {archive_name} from {url}");
    download_file(&client, &url, &archive_path).await?;

    let staging = temp_dir(home).join(format!("stage-{version}"));
    let installed = unpack_and_install(&archive_path, &staging, &dist, version);

    if let Err(e) = fs::remove_file(&archive_path) {
        log::warn!("Failed to remove downloaded archive {archive_path:?}: {e}");
    }
    remove_dir_if_present(&staging);

    installed?;
    Ok(dist)
}

/// Stream a GET response to `dest`. Terminal HTTP statuses fail; redirects
/// are followed by the client up to [`MAX_REDIRECTS`].
pub async fn download_file(client: &Client, url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| NeoError::io(e.to_string()))?;
    }

    let resp = client
        .get(url)
        .header("User-Agent", "neo-ondemand")
        .send()
        .await
        .map_err(|e| NeoError::download_with_url(url, e.to_string()))?;

    if !resp.status().is_success() {
        return Err(NeoError::download_with_url(url, resp.status().to_string()));
    }

    let mut file = fs::File::create(dest).map_err(|e| NeoError::io(e.to_string()))?;

    let mut stream = resp.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| NeoError::download_with_url(url, e.to_string()))?;
        file.write_all(&chunk)
            .map_err(|e| NeoError::io(e.to_string()))?;
    }

    Ok(())
}

/// Extract the archive into `staging` and rename the distribution directory
/// into its final place. Losing the rename race to a concurrent extraction
/// of the same version counts as success.
fn unpack_and_install(
    archive_path: &Path,
    staging: &Path,
    dist: &Path,
    version: &str,
) -> Result<()> {
    remove_dir_if_present(staging);
    extract_archive(archive_path, staging)?;

    let extracted = locate_dist_root(staging, version)?;

    if let Some(versions) = dist.parent() {
        fs::create_dir_all(versions).map_err(|e| NeoError::io(e.to_string()))?;
    }

    match fs::rename(&extracted, dist) {
        Ok(()) => Ok(()),
        Err(_) if dist.exists() => {
            log::info!("Distribution {version} appeared concurrently, keeping existing copy");
            Ok(())
        }
        Err(e) => Err(NeoError::io(format!(
            "failed to install distribution {version}: {e}"
        ))),
    }
}

/// Find the unpacked distribution root inside the staging directory: the
/// expected `neo4j-community-<version>` directory, or the single top-level
/// directory the archive shipped.
fn locate_dist_root(staging: &Path, version: &str) -> Result<PathBuf> {
    let expected = staging.join(dist_dir_name(version));
    if expected.is_dir() {
        return Ok(expected);
    }

    let mut dirs = Vec::new();
    let entries = fs::read_dir(staging).map_err(|e| NeoError::io(e.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|e| NeoError::io(e.to_string()))?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }

    match dirs.as_slice() {
        [single] => Ok(single.clone()),
        _ => Err(NeoError::extraction(format!(
            "archive for {version} did not contain a single distribution directory"
        ))),
    }
}

fn remove_dir_if_present(dir: &Path) {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove {dir:?}: {e}"),
    }
}
