//! Instance lifecycle management (setup/start/stop/restart).

use super::cleanup::purge_partial_downloads;
use super::initdb::init_db;
use super::EmbeddedPostgres;
use crate::error::{AppError, Result};
use crate::process::{
    marker_present, ProcessSupervisor, SupervisorConfig, SupervisorHandle, DEFAULT_STOP_TIMEOUT,
};
use crate::provision::PgBinaries;

impl EmbeddedPostgres {
    /// Create directories, provision binaries and initialise the cluster.
    ///
    /// Every step is skipped when its output already exists, so calling this
    /// again after a failure resumes where the last attempt stopped.
    pub async fn setup(&mut self) -> Result<()> {
        self.layout.ensure_dirs()?;
        purge_partial_downloads(&self.layout.binaries)?;

        let binaries = self.provisioner.ensure_binaries().await?;
        init_db(&binaries.initdb, &self.settings, &self.layout).await?;
        self.binaries = Some(binaries);
        Ok(())
    }

    /// Start the server and wait for the supervisor's acknowledgment.
    pub async fn start(&mut self) -> Result<()> {
        let supervisor = self.supervisor()?;
        supervisor.start().await?;
        self.started = true;
        Ok(())
    }

    /// Stop the server. Without a running server this is a no-op.
    pub async fn stop(&mut self) -> Result<()> {
        if self.supervisor.is_none() && !marker_present(&self.layout.data) {
            self.started = false;
            return Ok(());
        }

        let supervisor = self.supervisor()?;
        supervisor.stop().await?;
        self.started = false;
        Ok(())
    }

    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await?;
        self.start().await
    }

    /// Drop a supervisor stuck in `Failed` so the next command gets a fresh one.
    ///
    /// Returns whether a supervisor was discarded.
    pub fn discard_failed_supervisor(&mut self) -> bool {
        let failed = self
            .supervisor
            .as_ref()
            .is_some_and(|handle| handle.state().is_failed());
        if failed {
            log::info!("Discarding failed supervisor for {:?}", self.layout.data);
            self.supervisor = None;
        }
        failed
    }

    fn installed_binaries(&self) -> Result<PgBinaries> {
        if let Some(binaries) = &self.binaries {
            return Ok(binaries.clone());
        }
        let binaries = self.provisioner.binaries();
        if binaries.is_complete() {
            Ok(binaries)
        } else {
            Err(AppError::binary_not_found(
                &binaries.pg_ctl.display().to_string(),
            ))
        }
    }

    /// The supervisor, spawned on first use.
    fn supervisor(&mut self) -> Result<SupervisorHandle> {
        if let Some(handle) = &self.supervisor {
            return Ok(handle.clone());
        }

        let binaries = self.installed_binaries()?;
        let handle = ProcessSupervisor::spawn(SupervisorConfig {
            pg_ctl: binaries.pg_ctl,
            data_dir: self.layout.data.clone(),
            port: self.settings.port,
            parameters: self.settings.start_parameters.clone(),
            log_file: self.layout.server_log(),
            start_timeout: self.settings.start_timeout_duration(),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        });
        self.supervisor = Some(handle.clone());
        Ok(handle)
    }
}
