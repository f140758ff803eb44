//! Archive unpacking for the binary bundles.
//!
//! Every extractor refuses entries that would land outside the destination
//! directory, restores unix permission bits, and creates symlinks only after
//! all regular entries have been written.

mod extract;
mod links;
mod path;
mod tar_ops;
mod zip_ops;

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

pub(crate) use path::canonicalize_longest_prefix;
use path::parse_entry_rel_path;
use tar_ops::extract_tar;
use zip_ops::extract_zip_mapped;

/// Container formats understood by [`unpack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// Zip container, including `.jar` bundles
    Zip,
    /// xz-compressed tar (`.txz`, `.tar.xz`)
    TarXz,
    /// gzip-compressed tar (`.tgz`, `.tar.gz`)
    TarGz,
}

impl ArchiveFormat {
    /// Guess the format from a file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") || name.ends_with(".jar") {
            Some(Self::Zip)
        } else if name.ends_with(".txz") || name.ends_with(".tar.xz") {
            Some(Self::TarXz)
        } else if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }

    /// Whether this is one of the compressed tar formats.
    pub fn is_tarball(self) -> bool {
        matches!(self, Self::TarXz | Self::TarGz)
    }
}

fn open_archive(archive_path: &Path) -> Result<fs::File> {
    fs::File::open(archive_path).map_err(|e| {
        AppError::extraction(format!("failed to open {}: {e}", archive_path.display()))
    })
}

/// Unpack `archive_path` into `dest_dir`, keeping the archive's own layout.
pub fn unpack(format: ArchiveFormat, archive_path: &Path, dest_dir: &Path) -> Result<()> {
    match format {
        ArchiveFormat::Zip => extract_zip_mapped(archive_path, dest_dir, |raw| {
            parse_entry_rel_path(raw).map(|rel| dest_dir.join(rel))
        }),
        ArchiveFormat::TarXz => {
            let file = open_archive(archive_path)?;
            extract_tar(xz2::read::XzDecoder::new(file), dest_dir)
        }
        ArchiveFormat::TarGz => {
            let file = open_archive(archive_path)?;
            extract_tar(flate2::read::GzDecoder::new(file), dest_dir)
        }
    }
}

/// Pull the compressed tarballs out of a zip bundle, flattened into `dest_dir`.
///
/// Returns the paths of the tarballs written into `dest_dir`.
pub fn unpack_nested_tarballs(bundle_path: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    extract_zip_mapped(bundle_path, dest_dir, |raw| {
        let rel = parse_entry_rel_path(raw)?;
        let name = rel.file_name()?;
        let out = dest_dir.join(name);
        if ArchiveFormat::from_path(&out).is_some_and(ArchiveFormat::is_tarball) {
            written.push(out.clone());
            Some(out)
        } else {
            None
        }
    })?;
    Ok(written)
}
