//! Supervision of the server process.
//!
//! One [`ProcessSupervisor`] task exists per instance. It owns every call to
//! `pg_ctl` and receives commands over its own channel, so callers never
//! touch the process directly.

mod control;
mod supervisor;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub use control::{is_process_alive, marker_present, read_marker_pid};
pub(crate) use control::{log_output, output_detail, run_tool, RunError};
pub use supervisor::{ProcessSupervisor, SupervisorHandle};

use crate::error::AppError;

/// Idle wake-up interval of the supervisor loop.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on waiting for `postmaster.pid` to appear or vanish after `pg_ctl` returns.
const MARKER_WAIT: Duration = Duration::from_secs(5);

/// Delay between marker checks while waiting.
const MARKER_POLL: Duration = Duration::from_millis(50);

/// Bound on `pg_ctl stop -w`, which itself waits up to 60 s for shutdown.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(90);

/// Log lines quoted in a start failure.
const LOG_TAIL_LINES: usize = 20;

/// Commands understood by the supervisor. Everything needed to run them is
/// fixed when the supervisor is spawned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorCommand {
    Start,
    Stop,
}

#[derive(Debug, Clone)]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Stopping,
    /// Terminal. The supervisor must be replaced after fixing the cause.
    Failed(AppError),
}

impl SupervisorState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    pub fn failure(&self) -> Option<&AppError> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Failed(_) => "failed",
        }
    }
}

/// The (data dir, binary, port) binding of a supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub pg_ctl: PathBuf,
    pub data_dir: PathBuf,
    pub port: u16,
    pub parameters: BTreeMap<String, String>,
    /// Receives the output of `pg_ctl start` and of the server itself.
    pub log_file: PathBuf,
    pub start_timeout: Duration,
    pub stop_timeout: Duration,
}
