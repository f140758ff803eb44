//! The embedded server façade.
//!
//! An [`EmbeddedPostgres`] binds one settings record to one data directory:
//! - `binaries/{release}/{os}-{arch}/` holds the unpacked server tree, shared between instances
//! - `data/` is this instance's cluster, owned exclusively while the instance lives
//! - `runtime/` holds short-lived files such as the `initdb` password file

mod cleanup;
mod initdb;
mod lifecycle;
mod registry;
mod types;

use std::sync::Arc;

pub use types::InstanceStatus;

use self::registry::DataDirClaim;
use crate::config::PgSettings;
use crate::download::{Fetch, HttpFetcher};
use crate::error::{AppError, Result};
use crate::paths::PathLayout;
use crate::platform::Platform;
use crate::process::{
    is_process_alive, marker_present, read_marker_pid, SupervisorHandle, SupervisorState,
};
use crate::provision::{BinaryProvisioner, PgBinaries};

pub struct EmbeddedPostgres {
    settings: PgSettings,
    layout: PathLayout,
    provisioner: BinaryProvisioner,
    binaries: Option<PgBinaries>,
    supervisor: Option<SupervisorHandle>,
    started: bool,
    _claim: DataDirClaim,
}

impl EmbeddedPostgres {
    /// Create an instance that downloads binaries over HTTP.
    pub fn new(settings: PgSettings) -> Result<Self> {
        let fetcher: Arc<dyn Fetch> = Arc::new(HttpFetcher::new()?);
        Self::with_fetcher(settings, fetcher)
    }

    /// Create an instance with a custom fetch collaborator.
    ///
    /// Fails with `Config` on invalid settings and `DataDirInUse` when another
    /// live instance in this process owns the same data directory.
    pub fn with_fetcher(mut settings: PgSettings, fetcher: Arc<dyn Fetch>) -> Result<Self> {
        settings.validate()?;
        if settings.port == 0 {
            settings.port = portpicker::pick_unused_port()
                .ok_or_else(|| AppError::config("no free port available"))?;
            log::debug!("Picked free port {}", settings.port);
        }

        let layout = PathLayout::from_settings(&settings)?;
        let platform = Platform::current()?;
        let claim = DataDirClaim::acquire(&layout.data)?;
        let provisioner = BinaryProvisioner::new(
            layout.binaries.clone(),
            platform,
            settings.version,
            &settings.binary_repository_url,
            fetcher,
        );

        Ok(Self {
            settings,
            layout,
            provisioner,
            binaries: None,
            supervisor: None,
            started: false,
            _claim: claim,
        })
    }

    pub fn settings(&self) -> &PgSettings {
        &self.settings
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    /// The listen port, already resolved if the settings asked for `0`.
    pub fn port(&self) -> u16 {
        self.settings.port
    }

    pub fn status(&self) -> InstanceStatus {
        let state = match &self.supervisor {
            Some(handle) => handle.state(),
            None if marker_present(&self.layout.data) => SupervisorState::Running,
            None => SupervisorState::Idle,
        };
        let server_pid = read_marker_pid(&self.layout.data).filter(|pid| is_process_alive(*pid));

        InstanceStatus {
            started: self.started,
            state,
            port: self.settings.port,
            data_dir: self.layout.data.clone(),
            server_pid,
        }
    }

    /// `postgresql://` URI for the configured database.
    pub fn connection_string(&self) -> String {
        self.connection_string_for(&self.settings.database)
    }

    pub fn connection_string_for(&self, database: &str) -> String {
        format!(
            "postgresql://{}:{}@localhost:{}/{}",
            self.settings.username, self.settings.password, self.settings.port, database
        )
    }

    /// Remove the data directory. Refused (with a warning) while `postmaster.pid`
    /// exists; an already absent directory counts as success.
    pub fn dispose(&mut self) -> Result<()> {
        if cleanup::remove_data_dir(&self.layout.data)? {
            self.started = false;
        }
        Ok(())
    }
}

impl Drop for EmbeddedPostgres {
    fn drop(&mut self) {
        if self.started {
            log::warn!(
                "Instance for {:?} dropped while started, the server keeps running",
                self.layout.data
            );
        }
    }
}
