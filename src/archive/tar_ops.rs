use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

use super::extract::write_entry;
use super::links::{create_hard_link, create_pending_symlinks, defer_symlink, PendingSymlink};
use super::path::{parse_entry_rel_path, resolve_within_dir, validate_rel_link_target};

fn tar_err(e: io::Error) -> AppError {
    AppError::extraction(format!("corrupt tar stream: {e}"))
}

/// Extract a (decompressed) tar stream into `dest_dir`, keeping its layout.
pub(crate) fn extract_tar<R: io::Read>(reader: R, dest_dir: &Path) -> Result<()> {
    fs::create_dir_all(dest_dir)
        .map_err(|e| AppError::extraction(format!("failed to create {dest_dir:?}: {e}")))?;
    let mut archive = tar::Archive::new(reader);
    let mut written_files: HashSet<PathBuf> = HashSet::new();
    let mut pending: Vec<PendingSymlink> = Vec::new();

    for entry in archive.entries().map_err(tar_err)? {
        let mut entry = entry.map_err(tar_err)?;

        let raw_path = {
            let path = entry.path().map_err(tar_err)?;
            path.to_str()
                .ok_or_else(|| AppError::extraction(format!("tar entry {path:?} is not UTF-8")))?
                .to_string()
        };

        // The root entry `./` carries no content.
        if matches!(raw_path.as_str(), "." | "./") {
            continue;
        }
        let relative = parse_entry_rel_path(&raw_path).ok_or_else(|| {
            AppError::extraction(format!("tar entry {raw_path:?} is not a safe relative path"))
        })?;
        let out_path = resolve_within_dir(dest_dir, &dest_dir.join(&relative))?;

        let entry_type = entry.header().entry_type();
        match entry_type {
            tar::EntryType::Symlink => {
                let target = entry
                    .link_name()
                    .map_err(tar_err)?
                    .ok_or_else(|| AppError::extraction("symlink entry without a target"))?;
                pending.push(defer_symlink(&out_path, target.as_ref(), dest_dir)?);
            }
            tar::EntryType::Link => {
                let target = entry
                    .link_name()
                    .map_err(tar_err)?
                    .ok_or_else(|| AppError::extraction("hard link entry without a target"))?;
                validate_rel_link_target(target.as_ref(), "hard link")?;
                // GNU tar records hard link targets relative to the archive root.
                let target_rel = target
                    .to_str()
                    .and_then(parse_entry_rel_path)
                    .ok_or_else(|| AppError::extraction("hard link target is not a safe path"))?;
                let existing = resolve_within_dir(dest_dir, &dest_dir.join(target_rel))?;
                if !written_files.contains(&existing) {
                    return Err(AppError::extraction(format!(
                        "hard link {raw_path:?} refers to an entry not extracted before it"
                    )));
                }
                create_hard_link(&out_path, &existing)?;
                written_files.insert(out_path);
            }
            _ => {
                if !entry_type.is_dir() && !entry_type.is_file() {
                    log::debug!("Skipping tar entry {raw_path:?} of type {entry_type:?}");
                    continue;
                }
                let unix_mode = entry.header().mode().ok();
                let declared_size = if entry_type.is_file() {
                    Some(entry.header().size().map_err(tar_err)?)
                } else {
                    None
                };
                write_entry(
                    &out_path,
                    entry_type.is_dir(),
                    &mut entry,
                    unix_mode,
                    declared_size,
                )?;
                if entry_type.is_file() {
                    written_files.insert(out_path);
                }
            }
        }
    }

    create_pending_symlinks(pending)
}
