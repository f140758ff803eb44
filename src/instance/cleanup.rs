//! Data directory disposal and download leftovers.

use std::fs;
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use crate::error::{AppError, Result};
use crate::process::marker_present;

/// Remove the data directory unless a server still owns it.
///
/// Returns whether anything was deleted. An absent directory is not an error.
pub(super) fn remove_data_dir(data_dir: &Path) -> Result<bool> {
    if marker_present(data_dir) {
        log::warn!(
            "Not removing {:?}: postmaster.pid is present, stop the server first",
            data_dir
        );
        return Ok(false);
    }

    match fs::remove_dir_all(data_dir) {
        Ok(()) => {
            log::info!("Removed data directory {:?}", data_dir);
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(AppError::io(format!(
            "failed to remove {}: {e}",
            data_dir.display()
        ))),
    }
}

/// Delete `*.part` files left behind by interrupted downloads.
pub(super) fn purge_partial_downloads(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let path = entry.path();
        let is_part = entry.file_type().is_file()
            && path.extension().is_some_and(|ext| ext == "part");
        if is_part {
            if let Err(e) = fs::remove_file(path) {
                log::warn!("Failed to remove partial download {:?}: {}", path, e);
            } else {
                log::debug!("Removed partial download {:?}", path);
            }
        }
    }

    Ok(())
}
