use std::fs;
use std::io::Read as _;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

use super::extract::write_entry;
use super::links::{create_pending_symlinks, defer_symlink, PendingSymlink};
use super::path::{parse_entry_rel_path, resolve_within_dir};

/// Extract zip entries using a caller-provided destination resolver.
///
/// Returning `None` from `destination_for` skips the entry.
pub(crate) fn extract_zip_mapped<F>(
    archive_path: &Path,
    dest_dir: &Path,
    mut destination_for: F,
) -> Result<()>
where
    F: FnMut(&str) -> Option<PathBuf>,
{
    fs::create_dir_all(dest_dir)
        .map_err(|e| AppError::extraction(format!("failed to create {dest_dir:?}: {e}")))?;
    let file = fs::File::open(archive_path).map_err(|e| {
        AppError::extraction(format!("failed to open {}: {e}", archive_path.display()))
    })?;
    let mut archive = zip::ZipArchive::new(file)?;
    let mut pending: Vec<PendingSymlink> = Vec::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let raw_name = entry.name().to_string();

        if parse_entry_rel_path(&raw_name).is_none() {
            return Err(AppError::extraction(format!(
                "zip entry {raw_name:?} is not a safe relative path"
            )));
        }

        let Some(out_path) = destination_for(&raw_name) else {
            continue;
        };
        let out_path = resolve_within_dir(dest_dir, &out_path)?;

        if entry.is_symlink() {
            let mut target = String::new();
            entry.read_to_string(&mut target).map_err(|e| {
                AppError::extraction(format!("failed to read link target of {raw_name:?}: {e}"))
            })?;
            pending.push(defer_symlink(&out_path, Path::new(&target), dest_dir)?);
        } else {
            let is_dir = entry.is_dir();
            let unix_mode = entry.unix_mode();
            let declared_size = (!is_dir).then(|| entry.size());
            write_entry(&out_path, is_dir, &mut entry, unix_mode, declared_size)?;
        }
    }

    create_pending_symlinks(pending)
}
