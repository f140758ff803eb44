use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

use super::path::{resolve_within_dir, validate_rel_link_target};

/// A symlink whose creation waits until every regular entry is on disk.
pub(super) struct PendingSymlink {
    link: PathBuf,
    target: PathBuf,
    resolved_target: PathBuf,
}

#[cfg(unix)]
fn make_symlink(target: &Path, link: &Path, _target_is_dir: Option<bool>) -> Result<()> {
    std::os::unix::fs::symlink(target, link)
        .map_err(|e| AppError::extraction(format!("failed to create symlink {link:?}: {e}")))
}

#[cfg(windows)]
fn make_symlink(target: &Path, link: &Path, target_is_dir: Option<bool>) -> Result<()> {
    let result = match target_is_dir {
        Some(true) => std::os::windows::fs::symlink_dir(target, link),
        Some(false) => std::os::windows::fs::symlink_file(target, link),
        None => {
            return Err(AppError::extraction(format!(
                "symlink {link:?} points at {target:?}, which is not in the archive"
            )))
        }
    };
    result.map_err(|e| AppError::extraction(format!("failed to create symlink {link:?}: {e}")))
}

#[cfg(not(any(unix, windows)))]
fn make_symlink(_target: &Path, link: &Path, _target_is_dir: Option<bool>) -> Result<()> {
    Err(AppError::extraction(format!(
        "cannot create symlink {link:?} on this platform"
    )))
}

fn ensure_parent(path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| AppError::extraction(format!("{path:?} has no parent directory")))?;
    fs::create_dir_all(parent)
        .map_err(|e| AppError::extraction(format!("failed to create directory {parent:?}: {e}")))
}

/// Validate a symlink entry now; create it later with [`create_pending_symlinks`].
pub(super) fn defer_symlink(link: &Path, target: &Path, dest_dir: &Path) -> Result<PendingSymlink> {
    validate_rel_link_target(target, "symlink")?;
    let parent = link
        .parent()
        .ok_or_else(|| AppError::extraction(format!("{link:?} has no parent directory")))?;
    let resolved_target = resolve_within_dir(dest_dir, &parent.join(target))?;
    Ok(PendingSymlink {
        link: link.to_path_buf(),
        target: target.to_path_buf(),
        resolved_target,
    })
}

pub(super) fn create_pending_symlinks(pending: Vec<PendingSymlink>) -> Result<()> {
    for item in pending {
        ensure_parent(&item.link)?;
        if item.link.symlink_metadata().is_ok() {
            fs::remove_file(&item.link).map_err(|e| {
                AppError::extraction(format!("failed to replace {:?}: {e}", item.link))
            })?;
        }
        let target_is_dir = item
            .resolved_target
            .exists()
            .then(|| item.resolved_target.is_dir());
        make_symlink(&item.target, &item.link, target_is_dir)?;
    }
    Ok(())
}

/// Hard links fall back to a copy on filesystems that refuse them.
pub(super) fn create_hard_link(link: &Path, existing: &Path) -> Result<()> {
    ensure_parent(link)?;
    if let Err(e) = fs::hard_link(existing, link) {
        log::warn!("hard_link {:?} failed ({e}), copying instead", link);
        fs::copy(existing, link).map_err(|e| {
            AppError::extraction(format!("failed to copy {existing:?} to {link:?}: {e}"))
        })?;
    }
    Ok(())
}
