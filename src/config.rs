use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{PgVersion, DEFAULT_REPOSITORY_URL};
use crate::error::{AppError, Result};

pub const DEFAULT_PORT: u16 = 5432;
const DEFAULT_START_TIMEOUT_SECS: u64 = 30;

/// Settings for one embedded server. Immutable once handed to an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgSettings {
    pub version: PgVersion,
    /// Listen port. `0` picks a free port when the instance is created.
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    /// Absolute base directory every relative sub-path is resolved against.
    pub base_path: PathBuf,
    pub cache_path: PathBuf,
    pub runtime_path: PathBuf,
    pub data_path: PathBuf,
    pub binaries_path: PathBuf,
    pub locale: Option<String>,
    /// Extra `-c key=value` server parameters.
    pub start_parameters: BTreeMap<String, String>,
    pub binary_repository_url: String,
    /// Seconds to wait for `pg_ctl start -w` to return.
    pub start_timeout: u64,
}

fn default_base_path() -> PathBuf {
    dirs::cache_dir()
        .or_else(dirs::home_dir)
        .map(|dir| dir.join("embedded-postgres"))
        .unwrap_or_default()
}

impl Default for PgSettings {
    fn default() -> Self {
        Self {
            version: PgVersion::default(),
            port: DEFAULT_PORT,
            database: "postgres".to_string(),
            username: "postgres".to_string(),
            password: "postgres".to_string(),
            base_path: default_base_path(),
            cache_path: PathBuf::from("cache"),
            runtime_path: PathBuf::from("runtime"),
            data_path: PathBuf::from("data"),
            binaries_path: PathBuf::from("binaries"),
            locale: None,
            start_parameters: BTreeMap::new(),
            binary_repository_url: DEFAULT_REPOSITORY_URL.to_string(),
            start_timeout: DEFAULT_START_TIMEOUT_SECS,
        }
    }
}

impl PgSettings {
    /// Defaults rooted at `base_path`.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            ..Self::default()
        }
    }

    pub fn with_version(mut self, version: PgVersion) -> Self {
        self.version = version;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.start_parameters
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_repository(mut self, url: &str) -> Self {
        self.binary_repository_url = url.to_string();
        self
    }

    pub fn start_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.start_timeout)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject settings that would make any filesystem operation ambiguous.
    pub fn validate(&self) -> Result<()> {
        if self.base_path.as_os_str().is_empty() {
            return Err(AppError::config("base path is empty"));
        }
        if !self.base_path.is_absolute() {
            return Err(AppError::config(format!(
                "base path must be absolute: {}",
                self.base_path.display()
            )));
        }
        if self.data_path.as_os_str().is_empty() {
            return Err(AppError::config("data path is empty"));
        }
        if self.binaries_path.as_os_str().is_empty() {
            return Err(AppError::config("binaries path is empty"));
        }
        let repo = self.binary_repository_url.as_str();
        if !(repo.starts_with("http://") || repo.starts_with("https://")) {
            return Err(AppError::config(format!(
                "binary repository must be an http(s) URL: {repo:?}"
            )));
        }
        if self.start_timeout == 0 {
            return Err(AppError::config("start timeout must be greater than zero"));
        }
        if self.username.is_empty() {
            return Err(AppError::config("username is empty"));
        }
        Ok(())
    }
}
