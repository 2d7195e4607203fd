//! Line-oriented `key=value` configuration merging.
//!
//! `neo4j.conf` is treated as plain text, not a structured format: lines
//! whose key matches an override are dropped, every other line survives
//! verbatim and in order, and the overrides are appended at the end. Running
//! the same merge twice therefore yields the same file.

use std::fs;
use std::path::Path;

use crate::error::{NeoError, Result};

/// Merge `overrides` into the config file at `base_path`, writing the result
/// to `out_path` (the two may be the same file). A missing base file is a
/// fatal configuration error.
pub fn apply_overrides(
    base_path: &Path,
    out_path: &Path,
    overrides: &[(String, String)],
) -> Result<()> {
    let content = fs::read_to_string(base_path).map_err(|e| {
        NeoError::config(format!(
            "failed to read base config {}: {e}",
            base_path.display()
        ))
    })?;

    let mut lines: Vec<&str> = content
        .lines()
        .filter(|line| !is_overridden(line, overrides))
        .collect();

    let appended: Vec<String> = overrides
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    lines.extend(appended.iter().map(String::as_str));

    let mut merged = lines.join("\n");
    merged.push('\n');

    fs::write(out_path, merged).map_err(|e| {
        NeoError::config(format!(
            "failed to write config {}: {e}",
            out_path.display()
        ))
    })
}

/// A line is replaced when its key token (the text before `=`, with comment
/// markers stripped) starts with one of the override keys. Matching the
/// commented-out form keeps `#dbms.connector.https.enabled=true` from
/// surviving next to an active override of the same key.
fn is_overridden(line: &str, overrides: &[(String, String)]) -> bool {
    let Some(key) = line_key(line) else {
        return false;
    };
    overrides.iter().any(|(k, _)| key.starts_with(k.as_str()))
}

fn line_key(line: &str) -> Option<&str> {
    let (raw_key, _) = line.split_once('=')?;
    let key = raw_key.trim().trim_start_matches('#').trim();
    if key.is_empty() {
        None
    } else {
        Some(key)
    }
}

/// The override set staged into every instance's private config: plain-HTTP
/// only, no auth, both connectors bound to the instance's ports, data kept
/// inside the workspace, and a per-instance default database name.
pub fn instance_overrides(
    store_dir: &Path,
    http_port: u16,
    bolt_port: u16,
) -> Vec<(String, String)> {
    vec![
        (
            "dbms.default_database".to_string(),
            format!("neo-ondemand-{http_port}"),
        ),
        (
            "dbms.connector.https.enabled".to_string(),
            "false".to_string(),
        ),
        (
            "dbms.security.auth_enabled".to_string(),
            "false".to_string(),
        ),
        (
            "dbms.connector.bolt.listen_address".to_string(),
            format!(":{bolt_port}"),
        ),
        (
            "dbms.connector.http.listen_address".to_string(),
            format!(":{http_port}"),
        ),
        (
            "dbms.directories.data".to_string(),
            store_dir.display().to_string(),
        ),
    ]
}
