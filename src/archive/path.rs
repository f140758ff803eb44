use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{AppError, Result};

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic()
}

/// Turn a raw archive entry name into a relative path.
///
/// Returns `None` for empty names, absolute names, drive-prefixed names and
/// anything containing `..`. `./` segments (common in tarballs) are dropped.
pub(crate) fn parse_entry_rel_path(raw: &str) -> Option<PathBuf> {
    let normalized = raw.replace('\\', "/");
    if normalized.starts_with('/') || has_drive_prefix(&normalized) {
        return None;
    }

    let mut relative = PathBuf::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            _ => relative.push(part),
        }
    }

    if relative.as_os_str().is_empty() {
        None
    } else {
        Some(relative)
    }
}

/// Lexically normalise `path`, then canonicalise its longest existing prefix
/// and re-append the components that do not exist yet.
pub(crate) fn canonicalize_longest_prefix(path: &Path) -> Result<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::Normal(segment) => normalized.push(segment),
            Component::ParentDir => {
                if !normalized.pop() && !normalized.has_root() {
                    return Err(AppError::extraction(format!(
                        "path {path:?} climbs above the filesystem root"
                    )));
                }
            }
        }
    }

    let mut existing = normalized.clone();
    let mut missing: Vec<OsString> = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                resolved.extend(missing.iter().rev());
                return Ok(resolved);
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                let Some(name) = existing.file_name().map(|n| n.to_owned()) else {
                    return Err(AppError::extraction(format!(
                        "no existing ancestor for {normalized:?}"
                    )));
                };
                missing.push(name);
                if !existing.pop() {
                    return Err(AppError::extraction(format!(
                        "no existing ancestor for {normalized:?}"
                    )));
                }
            }
            Err(error) => {
                return Err(AppError::extraction(format!(
                    "failed to resolve {existing:?}: {error}"
                )));
            }
        }
    }
}

/// Resolve `path` and make sure it stays inside `base_dir`.
///
/// The last component is kept as is, so a link left by an earlier extraction
/// resolves to the link itself and not to what it points at.
pub(super) fn resolve_within_dir(base_dir: &Path, path: &Path) -> Result<PathBuf> {
    let canonical_base = base_dir.canonicalize().map_err(|e| {
        AppError::extraction(format!("failed to resolve {}: {e}", base_dir.display()))
    })?;
    let candidate = if path.is_absolute() {
        path.to_path_buf()
    } else {
        canonical_base.join(path)
    };
    let resolved = match (candidate.parent(), candidate.file_name()) {
        (Some(parent), Some(name)) => canonicalize_longest_prefix(parent)?.join(name),
        _ => canonicalize_longest_prefix(&candidate)?,
    };

    if !resolved.starts_with(&canonical_base) {
        return Err(AppError::extraction(format!(
            "entry {} escapes {}",
            path.display(),
            base_dir.display()
        )));
    }

    Ok(resolved)
}

/// Reject link targets that could never be safe inside the destination.
pub(super) fn validate_rel_link_target(target: &Path, kind: &str) -> Result<()> {
    if target.as_os_str().is_empty() {
        return Err(AppError::extraction(format!("{kind} has an empty target")));
    }
    let has_prefix = target
        .components()
        .any(|component| matches!(component, Component::Prefix(_)))
        || target.to_str().is_some_and(has_drive_prefix);
    if target.is_absolute() || has_prefix {
        return Err(AppError::extraction(format!(
            "{kind} target {target:?} must be relative"
        )));
    }
    Ok(())
}
