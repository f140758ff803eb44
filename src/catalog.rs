//! Static mapping from logical versions to published binary bundles.
//!
//! Bundles are the `embedded-postgres-binaries` jars published under
//! `io/zonky/test/postgres` in a Maven layout. Each jar holds a single
//! `postgres-{os}-{arch}.txz` with the `bin/`, `lib/` and `share/` trees.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::platform::Platform;

pub const DEFAULT_REPOSITORY_URL: &str = "https://repo1.maven.org/maven2";

const GROUP_PATH: &str = "io/zonky/test/postgres";
const ARTIFACT_PREFIX: &str = "embedded-postgres-binaries";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PgVersion {
    #[serde(rename = "17")]
    V17,
    #[default]
    #[serde(rename = "16")]
    V16,
    #[serde(rename = "15")]
    V15,
    #[serde(rename = "14")]
    V14,
    #[serde(rename = "13")]
    V13,
}

impl PgVersion {
    /// Exact upstream release string.
    pub fn release(self) -> &'static str {
        match self {
            Self::V17 => "17.4.0",
            Self::V16 => "16.8.0",
            Self::V15 => "15.12.0",
            Self::V14 => "14.17.0",
            Self::V13 => "13.20.0",
        }
    }

    pub fn major(self) -> &'static str {
        match self {
            Self::V17 => "17",
            Self::V16 => "16",
            Self::V15 => "15",
            Self::V14 => "14",
            Self::V13 => "13",
        }
    }

    pub fn all() -> &'static [Self] {
        &[Self::V17, Self::V16, Self::V15, Self::V14, Self::V13]
    }
}

impl fmt::Display for PgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.major())
    }
}

impl FromStr for PgVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let major = s.trim().trim_start_matches(['v', 'V']);
        let major = major.split('.').next().unwrap_or(major);
        Self::all()
            .iter()
            .copied()
            .find(|v| v.major() == major)
            .ok_or_else(|| AppError::config(format!("unsupported PostgreSQL version: {s}")))
    }
}

fn artifact_id(platform: &Platform) -> String {
    format!("{ARTIFACT_PREFIX}-{}", platform.tag())
}

/// File name of the outer bundle, e.g.
/// `embedded-postgres-binaries-linux-amd64-16.8.0.jar`.
pub fn archive_file_name(platform: &Platform, version: PgVersion) -> String {
    format!("{}-{}.jar", artifact_id(platform), version.release())
}

/// Download URL of the outer bundle below `repository`.
pub fn archive_url(repository: &str, platform: &Platform, version: PgVersion) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        repository.trim_end_matches('/'),
        GROUP_PATH,
        artifact_id(platform),
        version.release(),
        archive_file_name(platform, version)
    )
}

/// Name of the compressed tree packed inside the outer bundle.
pub fn inner_archive_name(platform: &Platform) -> String {
    format!(
        "postgres-{}-{}.txz",
        platform.os.as_str(),
        platform.arch.short_name()
    )
}

/// Version-scoped extraction directory, `binaries/{release}/{os}-{arch}`.
pub fn extraction_dir(binaries: &Path, platform: &Platform, version: PgVersion) -> PathBuf {
    binaries.join(version.release()).join(platform.tag())
}

pub fn initdb_rel_path(platform: &Platform) -> PathBuf {
    Path::new("bin").join(format!("initdb{}", platform.os.exe_suffix()))
}

pub fn pg_ctl_rel_path(platform: &Platform) -> PathBuf {
    Path::new("bin").join(format!("pg_ctl{}", platform.os.exe_suffix()))
}
