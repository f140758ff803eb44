//! `pg_ctl` invocation and marker-file inspection.

use std::ffi::OsStr;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::{ExitStatus, Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use super::{MARKER_POLL, MARKER_WAIT};
use crate::paths::MARKER_FILE;

/// `postmaster.pid` exists in `data_dir`.
pub fn marker_present(data_dir: &Path) -> bool {
    data_dir.join(MARKER_FILE).is_file()
}

/// PID on the first line of `postmaster.pid`, if the file exists and parses.
pub fn read_marker_pid(data_dir: &Path) -> Option<u32> {
    let content = fs::read_to_string(data_dir.join(MARKER_FILE)).ok()?;
    content.lines().next()?.trim().parse().ok()
}

/// Check if a process is alive by PID.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(raw), None).is_ok()
}

/// Check if a process is alive by PID.
#[cfg(not(unix))]
pub fn is_process_alive(pid: u32) -> bool {
    let filter = format!("PID eq {pid}");
    std::process::Command::new("tasklist")
        .args(["/FI", &filter, "/NH"])
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).contains(&pid.to_string()))
        .unwrap_or(false)
}

/// Why a tool run did not produce an exit status.
pub(crate) enum RunError {
    Spawn(std::io::Error),
    TimedOut,
}

/// Run a tool to completion, capturing its output. The child is killed if
/// `limit` elapses first.
pub(crate) async fn run_tool<I, S>(
    program: &Path,
    args: I,
    limit: Duration,
) -> Result<Output, RunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    match tokio::time::timeout(limit, cmd.output()).await {
        Ok(result) => result.map_err(RunError::Spawn),
        Err(_) => Err(RunError::TimedOut),
    }
}

/// Run a tool that may leave a daemon behind, sending its output to `log`.
///
/// Only the tool's own exit is awaited. A daemon it forks may keep the
/// inherited stdout open for its whole life, so nothing here reads to EOF.
pub(crate) async fn run_tool_logged<I, S>(
    program: &Path,
    args: I,
    limit: Duration,
    log: &Path,
) -> Result<ExitStatus, RunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if let Some(parent) = log.parent() {
        fs::create_dir_all(parent).map_err(RunError::Spawn)?;
    }
    let open_log = || OpenOptions::new().create(true).append(true).open(log);
    let stdout = open_log().map_err(RunError::Spawn)?;
    let stderr = open_log().map_err(RunError::Spawn)?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .kill_on_drop(true);
    let mut child = cmd.spawn().map_err(RunError::Spawn)?;

    match tokio::time::timeout(limit, child.wait()).await {
        Ok(status) => status.map_err(RunError::Spawn),
        Err(_) => {
            if let Err(e) = child.start_kill() {
                log::warn!("Failed to kill {}: {e}", program.display());
            }
            Err(RunError::TimedOut)
        }
    }
}

/// Last `lines` non-empty lines of a log file, or a placeholder.
pub(crate) fn log_tail(path: &Path, lines: usize) -> String {
    let content = fs::read_to_string(path).unwrap_or_default();
    let tail: Vec<&str> = content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    if tail.is_empty() {
        return "(no output)".to_string();
    }
    tail[tail.len().saturating_sub(lines)..].join("\n")
}

/// Stderr if it says anything, stdout otherwise.
pub(crate) fn output_detail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let detail = stderr.trim();
    let detail = if detail.is_empty() {
        stdout.trim()
    } else {
        detail
    };
    if detail.is_empty() {
        "(no output)".to_string()
    } else {
        detail.to_string()
    }
}

pub(crate) fn log_output(tool: &str, output: &Output) {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stdout.trim().is_empty() {
        log::debug!("{tool} stdout: {}", stdout.trim());
    }
    if !stderr.trim().is_empty() {
        log::debug!("{tool} stderr: {}", stderr.trim());
    }
}

/// Poll until the marker's presence equals `present`, for at most `MARKER_WAIT`.
pub(super) async fn wait_for_marker(data_dir: &Path, present: bool) -> bool {
    let deadline = tokio::time::Instant::now() + MARKER_WAIT;
    loop {
        if marker_present(data_dir) == present {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(MARKER_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::{log_tail, marker_present, read_marker_pid};

    #[test]
    fn marker_pid_is_first_line() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(!marker_present(tmp.path()));
        assert_eq!(read_marker_pid(tmp.path()), None);

        fs::write(
            tmp.path().join("postmaster.pid"),
            "4242\n/var/lib/pg/data\n1700000000\n5432\n",
        )
        .unwrap();
        assert!(marker_present(tmp.path()));
        assert_eq!(read_marker_pid(tmp.path()), Some(4242));
    }

    #[test]
    fn garbage_marker_has_no_pid() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("postmaster.pid"), "not-a-pid\n").unwrap();
        assert!(marker_present(tmp.path()));
        assert_eq!(read_marker_pid(tmp.path()), None);
    }

    #[test]
    fn log_tail_keeps_last_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("postgres.log");
        assert_eq!(log_tail(&log, 3), "(no output)");

        fs::write(&log, "one\ntwo\n\nthree\nfour\n").unwrap();
        assert_eq!(log_tail(&log, 3), "two\nthree\nfour");
        assert_eq!(log_tail(&log, 10), "one\ntwo\nthree\nfour");
    }

    #[cfg(unix)]
    #[test]
    fn own_process_is_alive() {
        assert!(super::is_process_alive(std::process::id()));
    }
}
