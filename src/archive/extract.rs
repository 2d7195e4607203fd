use std::fs;
use std::io;
use std::path::Path;

use crate::error::{NeoError, Result};

#[cfg(unix)]
fn set_unix_permissions(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode))
            .map_err(|e| NeoError::io(format!("failed to set permissions on {path:?}: {e}")))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_unix_permissions(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

/// Write one archive entry to disk, creating parent directories as needed
/// and carrying over the entry's unix mode so launch scripts stay runnable.
pub(super) fn write_entry<R>(
    out_path: &Path,
    is_dir: bool,
    reader: &mut R,
    unix_mode: Option<u32>,
) -> Result<()>
where
    R: io::Read,
{
    if is_dir {
        fs::create_dir_all(out_path)
            .map_err(|e| NeoError::io(format!("failed to create directory {out_path:?}: {e}")))?;
        return Ok(());
    }

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| NeoError::io(format!("failed to create directory {parent:?}: {e}")))?;
    }

    let mut outfile =
        fs::File::create(out_path).map_err(|error| NeoError::io(error.to_string()))?;
    io::copy(reader, &mut outfile).map_err(|error| NeoError::io(error.to_string()))?;
    set_unix_permissions(out_path, unix_mode)?;
    Ok(())
}
