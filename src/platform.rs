use std::env::consts::{ARCH, OS};
use std::fmt;

use crate::error::{AppError, Result};

/// Operating system names as used by the binary repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsKind {
    Linux,
    Darwin,
    Windows,
}

/// CPU architecture names as used by the binary repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchKind {
    Amd64,
    I386,
    Arm64v8,
    Arm32v7,
    Ppc64le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Platform {
    pub os: OsKind,
    pub arch: ArchKind,
}

impl OsKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
            Self::Windows => "windows",
        }
    }

    /// Suffix appended to executables on this OS.
    pub fn exe_suffix(self) -> &'static str {
        match self {
            Self::Windows => ".exe",
            Self::Linux | Self::Darwin => "",
        }
    }
}

impl ArchKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::I386 => "i386",
            Self::Arm64v8 => "arm64v8",
            Self::Arm32v7 => "arm32v7",
            Self::Ppc64le => "ppc64le",
        }
    }

    /// Architecture spelling used inside the bundle for the inner archive name.
    pub fn short_name(self) -> &'static str {
        match self {
            Self::Amd64 => "x86_64",
            Self::I386 => "x86_32",
            Self::Arm64v8 => "arm_64",
            Self::Arm32v7 => "arm_32",
            Self::Ppc64le => "ppcle_64",
        }
    }
}

impl Platform {
    pub fn new(os: OsKind, arch: ArchKind) -> Self {
        Self { os, arch }
    }

    /// Detect the platform this process is running on.
    pub fn current() -> Result<Self> {
        Self::from_consts(OS, ARCH)
    }

    pub fn from_consts(os: &str, arch: &str) -> Result<Self> {
        let platform = match (os, arch) {
            ("linux", "x86_64") => Self::new(OsKind::Linux, ArchKind::Amd64),
            ("linux", "x86") => Self::new(OsKind::Linux, ArchKind::I386),
            ("linux", "aarch64") => Self::new(OsKind::Linux, ArchKind::Arm64v8),
            ("linux", "arm") => Self::new(OsKind::Linux, ArchKind::Arm32v7),
            ("linux", "powerpc64") => Self::new(OsKind::Linux, ArchKind::Ppc64le),
            ("macos", "x86_64") => Self::new(OsKind::Darwin, ArchKind::Amd64),
            ("macos", "aarch64") => Self::new(OsKind::Darwin, ArchKind::Arm64v8),
            ("windows", "x86_64") => Self::new(OsKind::Windows, ArchKind::Amd64),
            ("windows", "x86") => Self::new(OsKind::Windows, ArchKind::I386),
            _ => return Err(AppError::unsupported_platform(os, arch)),
        };
        Ok(platform)
    }

    /// `{os}-{arch}`, e.g. `linux-amd64`.
    pub fn tag(&self) -> String {
        format!("{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}
