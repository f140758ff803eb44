//! Centralized path utilities for an embedded server.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PgSettings;
use crate::error::{AppError, Result};

/// Written by the running server; its presence means "started".
pub const MARKER_FILE: &str = "postmaster.pid";

/// Written by `initdb`; its presence means the data directory is initialised.
pub const PG_VERSION_FILE: &str = "PG_VERSION";

/// Resolve `sub` against `base`. Absolute sub-paths are returned unchanged.
pub fn resolve(base: &Path, sub: &Path) -> PathBuf {
    if sub.is_absolute() {
        sub.to_path_buf()
    } else {
        base.join(sub)
    }
}

/// Concrete filesystem locations derived from [`PgSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    pub base: PathBuf,
    pub cache: PathBuf,
    pub runtime: PathBuf,
    pub data: PathBuf,
    pub binaries: PathBuf,
}

impl PathLayout {
    pub fn from_settings(settings: &PgSettings) -> Result<Self> {
        settings.validate()?;
        let base = settings.base_path.clone();
        Ok(Self {
            cache: resolve(&base, &settings.cache_path),
            runtime: resolve(&base, &settings.runtime_path),
            data: resolve(&base, &settings.data_path),
            binaries: resolve(&base, &settings.binaries_path),
            base,
        })
    }

    /// Create the base, cache, runtime and binaries directories if missing.
    ///
    /// The data directory is left to `initdb`, which refuses a non-empty one.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.base, &self.cache, &self.runtime, &self.binaries] {
            fs::create_dir_all(dir).map_err(|e| {
                AppError::io(format!("failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    pub fn marker_file(&self) -> PathBuf {
        self.data.join(MARKER_FILE)
    }

    pub fn pg_version_file(&self) -> PathBuf {
        self.data.join(PG_VERSION_FILE)
    }

    /// Server log passed to `pg_ctl start -l`.
    pub fn server_log(&self) -> PathBuf {
        self.runtime.join("postgres.log")
    }

    /// Temporary password file handed to `initdb`.
    pub fn pwfile(&self) -> PathBuf {
        self.runtime.join("pwfile")
    }
}
