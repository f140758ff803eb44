//! Process-wide ownership of data directories.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::archive::canonicalize_longest_prefix;
use crate::error::{AppError, Result};

static CLAIMED: OnceLock<Mutex<HashSet<PathBuf>>> = OnceLock::new();

fn claimed() -> &'static Mutex<HashSet<PathBuf>> {
    CLAIMED.get_or_init(Mutex::default)
}

/// Exclusive hold on one data directory, released on drop.
#[derive(Debug)]
pub(super) struct DataDirClaim {
    path: PathBuf,
}

impl DataDirClaim {
    pub(super) fn acquire(path: &Path) -> Result<Self> {
        // The directory may not exist yet; only its existing ancestors resolve.
        let key = canonicalize_longest_prefix(path).map_err(|e| {
            let detail = e.payload().get("detail").cloned().unwrap_or_default();
            AppError::config(format!("cannot resolve data dir {}: {detail}", path.display()))
        })?;
        let mut set = claimed().lock().unwrap_or_else(|e| e.into_inner());
        if !set.insert(key.clone()) {
            return Err(AppError::data_dir_in_use(&path.display().to_string()));
        }
        drop(set);
        Ok(Self { path: key })
    }
}

impl Drop for DataDirClaim {
    fn drop(&mut self) {
        claimed()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.path);
    }
}
