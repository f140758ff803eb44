//! Error types for provisioning and supervising an embedded server.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Crate error: a kind plus a small key/value payload describing the failure.
#[derive(Debug, Clone)]
pub struct AppError {
    payload: BTreeMap<String, String>,
    kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed settings, raised before any I/O
    Config,
    /// File system error
    Io,
    /// No binaries are published for this OS/arch
    UnsupportedPlatform,
    /// Another live instance already owns the data directory
    DataDirInUse,
    /// Archive could not be fetched
    DownloadFailed,
    /// Archive could not be unpacked
    ExtractionFailed,
    /// Extraction finished but an executable is missing
    BinaryNotFound,
    /// `pg_ctl start` failed or timed out
    StartFailed,
    /// `pg_ctl stop` failed
    StopFailed,
    /// `initdb` failed
    InitFailed,
    /// The supervisor task is no longer receiving commands
    SupervisorGone,
    /// General error
    Other,
}

impl ErrorKind {
    pub fn code(&self) -> u32 {
        match self {
            Self::Config => 2001,
            Self::Io => 2002,
            Self::UnsupportedPlatform => 2003,
            Self::DataDirInUse => 2004,
            Self::StartFailed => 3001,
            Self::StopFailed => 3002,
            Self::InitFailed => 3003,
            Self::SupervisorGone => 3004,
            Self::DownloadFailed => 4001,
            Self::ExtractionFailed => 4002,
            Self::BinaryNotFound => 4003,
            Self::Other => 9999,
        }
    }

    /// Errors raised by the binary provisioning pipeline.
    pub fn is_provision(&self) -> bool {
        matches!(
            self,
            Self::DownloadFailed | Self::ExtractionFailed | Self::BinaryNotFound
        )
    }

    /// Errors raised inside the supervisor while driving the server process.
    pub fn is_process(&self) -> bool {
        matches!(self, Self::StartFailed | Self::StopFailed)
    }
}

impl AppError {
    pub fn new(kind: ErrorKind, payload: BTreeMap<String, String>) -> Self {
        Self { payload, kind }
    }

    /// Create an error with a single "detail" key from a non-empty string,
    /// or an empty payload if the string is empty.
    fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let payload = if detail.is_empty() {
            BTreeMap::new()
        } else {
            BTreeMap::from([("detail".to_string(), detail)])
        };
        Self::new(kind, payload)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Config, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Io, message)
    }

    pub fn unsupported_platform(os: &str, arch: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedPlatform,
            BTreeMap::from([
                ("os".to_string(), os.to_string()),
                ("arch".to_string(), arch.to_string()),
            ]),
        )
    }

    pub fn data_dir_in_use(path: &str) -> Self {
        Self::new(
            ErrorKind::DataDirInUse,
            BTreeMap::from([("path".to_string(), path.to_string())]),
        )
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::DownloadFailed, message)
    }

    pub fn download_with_url(url: &str, detail: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::DownloadFailed,
            BTreeMap::from([
                ("url".to_string(), url.to_string()),
                ("detail".to_string(), detail.into()),
            ]),
        )
    }

    pub fn extraction(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::ExtractionFailed, message)
    }

    pub fn binary_not_found(path: &str) -> Self {
        Self::new(
            ErrorKind::BinaryNotFound,
            BTreeMap::from([("path".to_string(), path.to_string())]),
        )
    }

    pub fn start_failed(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::StartFailed, message)
    }

    pub fn stop_failed(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::StopFailed, message)
    }

    pub fn init_failed(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::InitFailed, message)
    }

    pub fn supervisor_gone() -> Self {
        Self::new(ErrorKind::SupervisorGone, BTreeMap::new())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::with_detail(ErrorKind::Other, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn payload(&self) -> &BTreeMap<String, String> {
        &self.payload
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.payload.is_empty() {
            write!(f, "{:?}", self.kind)
        } else {
            let pairs: Vec<String> = self
                .payload
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            write!(f, "{:?}: {}", self.kind, pairs.join(", "))
        }
    }
}

impl std::error::Error for AppError {}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct as _;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("code", &self.kind.code())?;
        s.serialize_field("payload", &self.payload)?;
        s.end()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::download(err.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::extraction(err.to_string())
    }
}

impl From<walkdir::Error> for AppError {
    fn from(err: walkdir::Error) -> Self {
        Self::io(err.to_string())
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
