//! Download-once, unpack-once provisioning of the server binaries.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{unpack, unpack_nested_tarballs, ArchiveFormat};
use crate::catalog::{self, PgVersion};
use crate::download::Fetch;
use crate::error::{AppError, ErrorKind, Result};
use crate::platform::Platform;

/// Resolved locations of the executables an instance needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgBinaries {
    pub root: PathBuf,
    pub initdb: PathBuf,
    pub pg_ctl: PathBuf,
}

impl PgBinaries {
    pub fn resolve(root: PathBuf, platform: &Platform) -> Self {
        Self {
            initdb: root.join(catalog::initdb_rel_path(platform)),
            pg_ctl: root.join(catalog::pg_ctl_rel_path(platform)),
            root,
        }
    }

    /// Both executables are on disk.
    pub fn is_complete(&self) -> bool {
        self.initdb.is_file() && self.pg_ctl.is_file()
    }
}

/// Makes sure the binaries for one (platform, version) pair are cached locally.
pub struct BinaryProvisioner {
    binaries_dir: PathBuf,
    platform: Platform,
    version: PgVersion,
    repository: String,
    fetcher: Arc<dyn Fetch>,
}

impl BinaryProvisioner {
    pub fn new(
        binaries_dir: PathBuf,
        platform: Platform,
        version: PgVersion,
        repository: &str,
        fetcher: Arc<dyn Fetch>,
    ) -> Self {
        Self {
            binaries_dir,
            platform,
            version,
            repository: repository.to_string(),
            fetcher,
        }
    }

    pub fn archive_path(&self) -> PathBuf {
        self.binaries_dir
            .join(catalog::archive_file_name(&self.platform, self.version))
    }

    pub fn extraction_dir(&self) -> PathBuf {
        catalog::extraction_dir(&self.binaries_dir, &self.platform, self.version)
    }

    pub fn binaries(&self) -> PgBinaries {
        PgBinaries::resolve(self.extraction_dir(), &self.platform)
    }

    /// Download, unpack and validate, skipping every step whose output already exists.
    ///
    /// Each step can be retried after a failure; nothing is ever deleted here.
    pub async fn ensure_binaries(&self) -> Result<PgBinaries> {
        let archive = self.archive_path();
        if archive.is_file() {
            log::debug!("Archive {:?} already cached", archive);
        } else {
            let url = catalog::archive_url(&self.repository, &self.platform, self.version);
            log::info!("Downloading PostgreSQL {} from {}", self.version.release(), url);
            self.fetcher
                .fetch(&url, &archive)
                .await
                .map_err(|e| as_download_error(e, &url))?;
        }

        let dest = self.extraction_dir();
        fs::create_dir_all(&dest).map_err(|e| {
            AppError::extraction(format!("failed to create {}: {e}", dest.display()))
        })?;

        let binaries = self.binaries();
        // A tree missing either executable is a partial extraction and is unpacked again.
        if has_bin_and_lib(&dest) && binaries.is_complete() {
            log::debug!("Binary tree in {:?} already unpacked", dest);
        } else {
            let inner_name = catalog::inner_archive_name(&self.platform);
            let archive_for_task = archive.clone();
            let dest_for_task = dest.clone();
            tokio::task::spawn_blocking(move || {
                unpack_layers(&archive_for_task, &dest_for_task, &inner_name)
            })
            .await
            .map_err(|e| AppError::extraction(format!("extraction task failed: {e}")))??;
        }

        for exe in [&binaries.initdb, &binaries.pg_ctl] {
            if !exe.is_file() {
                return Err(AppError::binary_not_found(&exe.display().to_string()));
            }
        }

        log::info!("PostgreSQL {} binaries ready in {:?}", self.version.release(), dest);
        Ok(binaries)
    }
}

fn as_download_error(err: AppError, url: &str) -> AppError {
    if err.kind() == ErrorKind::DownloadFailed {
        err
    } else {
        AppError::download_with_url(url, err.to_string())
    }
}

fn has_bin_and_lib(dir: &Path) -> bool {
    dir.join("bin").is_dir() && dir.join("lib").is_dir()
}

/// Find the platform tarball inside `dir`, preferring the catalog's exact name.
fn locate_inner_archive(dir: &Path, expected_name: &str) -> Option<PathBuf> {
    let expected = dir.join(expected_name);
    if expected.is_file() {
        return Some(expected);
    }

    let entries = fs::read_dir(dir).ok()?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("postgres-"))
                && ArchiveFormat::from_path(path).is_some_and(ArchiveFormat::is_tarball)
        })
        .collect();
    candidates.sort();
    candidates.into_iter().next()
}

/// Second and third provisioning steps: pull the tarball out of the bundle if
/// needed, then unpack the tarball beside it.
fn unpack_layers(bundle: &Path, dest: &Path, inner_name: &str) -> Result<()> {
    let inner = match locate_inner_archive(dest, inner_name) {
        Some(found) => {
            log::debug!("Inner archive {:?} already present", found);
            found
        }
        None => {
            log::info!("Unpacking {:?}", bundle);
            unpack_nested_tarballs(bundle, dest)?;
            locate_inner_archive(dest, inner_name).ok_or_else(|| {
                AppError::extraction(format!(
                    "{} does not contain {inner_name}",
                    bundle.display()
                ))
            })?
        }
    };

    let format = ArchiveFormat::from_path(&inner).ok_or_else(|| {
        AppError::extraction(format!("unknown archive format: {}", inner.display()))
    })?;
    log::info!("Unpacking {:?}", inner);
    unpack(format, &inner, dest)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{has_bin_and_lib, locate_inner_archive};

    #[test]
    fn inner_archive_prefers_expected_name() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("postgres-linux-arm_64.txz"), b"x").unwrap();
        fs::write(tmp.path().join("postgres-linux-x86_64.txz"), b"x").unwrap();

        let found = locate_inner_archive(tmp.path(), "postgres-linux-x86_64.txz").unwrap();
        assert!(found.ends_with("postgres-linux-x86_64.txz"));
    }

    #[test]
    fn inner_archive_falls_back_to_any_postgres_tarball() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("README"), b"x").unwrap();
        assert!(locate_inner_archive(tmp.path(), "postgres-linux-x86_64.txz").is_none());

        fs::write(tmp.path().join("postgres-linux-amd64.tar.gz"), b"x").unwrap();
        let found = locate_inner_archive(tmp.path(), "postgres-linux-x86_64.txz").unwrap();
        assert!(found.ends_with("postgres-linux-amd64.tar.gz"));
    }

    #[test]
    fn partial_tree_is_not_complete() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("bin")).unwrap();
        assert!(!has_bin_and_lib(tmp.path()));
        fs::create_dir(tmp.path().join("lib")).unwrap();
        assert!(has_bin_and_lib(tmp.path()));
    }
}
