use std::fs;
use std::io;
use std::path::Path;

use crate::error::{AppError, Result};

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt as _;

    if let Some(mode) = mode {
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777)).map_err(|e| {
            AppError::extraction(format!("failed to set permissions on {path:?}: {e}"))
        })?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .map_err(|e| AppError::extraction(format!("failed to create directory {dir:?}: {e}")))
}

/// Write one directory or regular file entry.
///
/// `declared_size` guards against archives whose entries end early.
pub(super) fn write_entry<R>(
    out_path: &Path,
    is_dir: bool,
    reader: &mut R,
    unix_mode: Option<u32>,
    declared_size: Option<u64>,
) -> Result<()>
where
    R: io::Read,
{
    if is_dir {
        return ensure_dir(out_path);
    }

    if let Some(parent) = out_path.parent() {
        ensure_dir(parent)?;
    }
    // A retried extraction must not write through a link left by the previous attempt.
    if out_path
        .symlink_metadata()
        .is_ok_and(|meta| meta.file_type().is_symlink())
    {
        fs::remove_file(out_path)
            .map_err(|e| AppError::extraction(format!("failed to replace {out_path:?}: {e}")))?;
    }

    let mut outfile = fs::File::create(out_path)
        .map_err(|e| AppError::extraction(format!("failed to create {out_path:?}: {e}")))?;
    let written = io::copy(reader, &mut outfile)
        .map_err(|e| AppError::extraction(format!("failed to write {out_path:?}: {e}")))?;
    if let Some(expected) = declared_size {
        if written != expected {
            return Err(AppError::extraction(format!(
                "{out_path:?} is truncated: expected {expected} bytes, wrote {written}"
            )));
        }
    }
    apply_mode(out_path, unix_mode)
}
