//! Instance-related type definitions.

use std::path::PathBuf;

use crate::process::SupervisorState;

/// Point-in-time view of an instance.
#[derive(Debug, Clone)]
pub struct InstanceStatus {
    /// The last successful start or stop was a start.
    pub started: bool,
    pub state: SupervisorState,
    pub port: u16,
    pub data_dir: PathBuf,
    /// PID from `postmaster.pid`, only if that process is alive.
    pub server_pid: Option<u32>,
}

impl InstanceStatus {
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}
