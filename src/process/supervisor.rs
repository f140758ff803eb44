use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;

use super::control::{
    log_output, log_tail, marker_present, output_detail, run_tool, run_tool_logged,
    wait_for_marker, RunError,
};
use super::{
    SupervisorCommand, SupervisorConfig, SupervisorState, LOG_TAIL_LINES, MARKER_WAIT,
    POLL_INTERVAL,
};
use crate::error::{AppError, Result};
use crate::options::encode_options;

struct Envelope {
    command: SupervisorCommand,
    reply: oneshot::Sender<Result<()>>,
}

/// Caller side of a supervisor. Cloning shares the same worker; the worker
/// exits once every handle is gone.
#[derive(Clone)]
pub struct SupervisorHandle {
    tx: mpsc::UnboundedSender<Envelope>,
    state: watch::Receiver<SupervisorState>,
    data_dir: PathBuf,
}

impl SupervisorHandle {
    /// Start the server and wait until the supervisor reports the outcome.
    pub async fn start(&self) -> Result<()> {
        self.send(SupervisorCommand::Start).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(SupervisorCommand::Stop).await
    }

    pub fn state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    /// Wait for the next published state change.
    pub async fn changed(&mut self) -> Result<SupervisorState> {
        self.state
            .changed()
            .await
            .map_err(|_| AppError::supervisor_gone())?;
        Ok(self.state.borrow_and_update().clone())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Worker task is still receiving commands.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }

    async fn send(&self, command: SupervisorCommand) -> Result<()> {
        let (reply, ack) = oneshot::channel();
        self.tx
            .send(Envelope { command, reply })
            .map_err(|_| AppError::supervisor_gone())?;
        ack.await.map_err(|_| AppError::supervisor_gone())?
    }
}

/// Worker owning one (data dir, `pg_ctl`, port) binding. Commands are run one
/// at a time in arrival order.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    state: watch::Sender<SupervisorState>,
}

impl ProcessSupervisor {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(config: SupervisorConfig) -> SupervisorHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let initial = if marker_present(&config.data_dir) {
            SupervisorState::Running
        } else {
            SupervisorState::Idle
        };
        let (state, state_rx) = watch::channel(initial);
        let data_dir = config.data_dir.clone();

        let worker = Self { config, state };
        tokio::spawn(worker.run(rx));

        SupervisorHandle {
            tx,
            state: state_rx,
            data_dir,
        }
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        log::debug!("Supervisor for {:?} started", self.config.data_dir);
        let mut tick = tokio::time::interval(POLL_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                envelope = rx.recv() => {
                    let Some(Envelope { command, reply }) = envelope else {
                        break;
                    };
                    let result = self.handle(command).await;
                    // The caller may have given up waiting; the outcome stays in `state`.
                    let _ = reply.send(result);
                }
                _ = tick.tick() => self.observe_marker(),
            }
        }

        log::debug!("Supervisor for {:?} exited", self.config.data_dir);
    }

    fn current(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    fn transition(&self, next: SupervisorState) {
        let next_name = next.name();
        let previous = self.state.send_replace(next);
        if previous.name() != next_name {
            log::info!(
                "Server in {:?}: {} -> {}",
                self.config.data_dir,
                previous.name(),
                next_name
            );
        }
    }

    fn fail(&self, err: AppError) -> AppError {
        log::error!("Server in {:?} failed: {}", self.config.data_dir, err);
        self.transition(SupervisorState::Failed(err.clone()));
        err
    }

    /// Follow changes made behind our back while idle.
    fn observe_marker(&self) {
        let present = marker_present(&self.config.data_dir);
        match self.current() {
            SupervisorState::Running if !present => {
                log::warn!(
                    "postmaster.pid vanished from {:?}, server is gone",
                    self.config.data_dir
                );
                self.transition(SupervisorState::Idle);
            }
            SupervisorState::Idle if present => {
                log::info!(
                    "postmaster.pid appeared in {:?}, server was started externally",
                    self.config.data_dir
                );
                self.transition(SupervisorState::Running);
            }
            _ => {}
        }
    }

    async fn handle(&self, command: SupervisorCommand) -> Result<()> {
        if let SupervisorState::Failed(err) = self.current() {
            return Err(err);
        }
        match command {
            SupervisorCommand::Start => self.start().await,
            SupervisorCommand::Stop => self.stop().await,
        }
    }

    async fn start(&self) -> Result<()> {
        let data_dir = &self.config.data_dir;
        if marker_present(data_dir) {
            log::info!("Server in {:?} is already running", data_dir);
            self.transition(SupervisorState::Running);
            return Ok(());
        }

        self.transition(SupervisorState::Starting);
        let options = encode_options(self.config.port, &self.config.parameters);
        let log_file = &self.config.log_file;
        let args: [OsString; 8] = [
            "start".into(),
            "-w".into(),
            "-D".into(),
            data_dir.into(),
            "-l".into(),
            log_file.into(),
            "-o".into(),
            options.into(),
        ];

        let limit = self.config.start_timeout;
        match run_tool_logged(&self.config.pg_ctl, args, limit, log_file).await {
            Ok(status) if status.success() => {
                log::debug!("pg_ctl start finished, server log at {:?}", log_file);
            }
            Ok(status) => {
                return Err(self.fail(AppError::start_failed(format!(
                    "pg_ctl start exited with {status}: {}",
                    log_tail(log_file, LOG_TAIL_LINES)
                ))));
            }
            Err(RunError::Spawn(e)) => {
                return Err(self.fail(AppError::start_failed(format!(
                    "failed to run {}: {e}",
                    self.config.pg_ctl.display()
                ))));
            }
            Err(RunError::TimedOut) => {
                return Err(self.fail(AppError::start_failed(format!(
                    "pg_ctl start did not finish within {}s: {}",
                    self.config.start_timeout.as_secs(),
                    log_tail(log_file, LOG_TAIL_LINES)
                ))));
            }
        }

        if !wait_for_marker(data_dir, true).await {
            return Err(self.fail(AppError::start_failed(format!(
                "pg_ctl start returned but postmaster.pid did not appear within {}s: {}",
                MARKER_WAIT.as_secs(),
                log_tail(log_file, LOG_TAIL_LINES)
            ))));
        }

        self.transition(SupervisorState::Running);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let data_dir = &self.config.data_dir;
        if !marker_present(data_dir) {
            log::debug!("Server in {:?} is not running, nothing to stop", data_dir);
            self.transition(SupervisorState::Idle);
            return Ok(());
        }

        self.transition(SupervisorState::Stopping);
        let args: [OsString; 4] = ["stop".into(), "-w".into(), "-D".into(), data_dir.into()];

        match run_tool(&self.config.pg_ctl, args, self.config.stop_timeout).await {
            Ok(output) if output.status.success() => log_output("pg_ctl stop", &output),
            Ok(output) => {
                return Err(self.fail(AppError::stop_failed(format!(
                    "pg_ctl stop exited with {}: {}",
                    output.status,
                    output_detail(&output)
                ))));
            }
            Err(RunError::Spawn(e)) => {
                return Err(self.fail(AppError::stop_failed(format!(
                    "failed to run {}: {e}",
                    self.config.pg_ctl.display()
                ))));
            }
            Err(RunError::TimedOut) => {
                return Err(self.fail(AppError::stop_failed(format!(
                    "pg_ctl stop did not finish within {}s",
                    self.config.stop_timeout.as_secs()
                ))));
            }
        }

        if !wait_for_marker(data_dir, false).await {
            return Err(self.fail(AppError::stop_failed(format!(
                "pg_ctl stop returned but postmaster.pid is still present after {}s",
                MARKER_WAIT.as_secs()
            ))));
        }

        self.transition(SupervisorState::Idle);
        Ok(())
    }
}
