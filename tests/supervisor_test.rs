#![cfg(unix)]

mod common;

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use embedded_postgres::{
    is_process_alive, read_marker_pid, ErrorKind, ProcessSupervisor, SupervisorConfig,
    SupervisorState,
};

use common::{read_log, FAKE_PG_CTL};

fn install_pg_ctl(base: &Path) -> PathBuf {
    let bin = base.join("bin");
    fs::create_dir_all(&bin).unwrap();
    let pg_ctl = bin.join("pg_ctl");
    fs::write(&pg_ctl, FAKE_PG_CTL).unwrap();
    fs::set_permissions(&pg_ctl, fs::Permissions::from_mode(0o755)).unwrap();
    pg_ctl
}

fn config(base: &Path) -> SupervisorConfig {
    let data_dir = base.join("data");
    fs::create_dir_all(&data_dir).unwrap();
    SupervisorConfig {
        pg_ctl: install_pg_ctl(base),
        data_dir,
        port: 5544,
        parameters: BTreeMap::from([("shared_buffers".to_string(), "32MB".to_string())]),
        log_file: server_log(base),
        start_timeout: Duration::from_secs(5),
        stop_timeout: Duration::from_secs(5),
    }
}

fn server_log(base: &Path) -> PathBuf {
    base.join("runtime").join("postgres.log")
}

fn marker(base: &Path) -> PathBuf {
    base.join("data").join("postmaster.pid")
}

async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..60 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

#[tokio::test]
async fn test_start_then_stop() {
    let tmp = tempfile::tempdir().unwrap();
    let handle = ProcessSupervisor::spawn(config(tmp.path()));
    assert!(matches!(handle.state(), SupervisorState::Idle));

    handle.start().await.unwrap();
    assert!(handle.state().is_running());
    assert!(marker(tmp.path()).is_file());

    let pid = read_marker_pid(&tmp.path().join("data")).unwrap();
    assert_eq!(pid, std::process::id());
    assert!(is_process_alive(pid));

    handle.stop().await.unwrap();
    assert!(matches!(handle.state(), SupervisorState::Idle));
    assert!(!marker(tmp.path()).exists());

    let log = read_log(&tmp.path().join("pg_ctl.log"));
    assert_eq!(log.len(), 2);
    assert_eq!(log[0], r#"start -p 5544 -c shared_buffers="32MB""#);
    assert!(log[1].starts_with("stop"));
    assert!(read_log(&server_log(tmp.path())).contains(&"server started".to_string()));
}

#[tokio::test]
async fn test_start_returns_while_daemon_holds_output() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    cfg.start_timeout = Duration::from_secs(3);
    fs::write(tmp.path().join("pg_ctl_daemon"), "").unwrap();
    let handle = ProcessSupervisor::spawn(cfg);

    let began = Instant::now();
    handle.start().await.unwrap();
    assert!(began.elapsed() < Duration::from_secs(3));
    assert!(handle.state().is_running());
    assert!(marker(tmp.path()).is_file());

    handle.stop().await.unwrap();
    assert!(matches!(handle.state(), SupervisorState::Idle));
}

#[tokio::test]
async fn test_existing_marker_means_running_without_spawn() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config(tmp.path());
    fs::write(marker(tmp.path()), "1\n").unwrap();

    let handle = ProcessSupervisor::spawn(cfg);
    assert!(handle.state().is_running());
    handle.start().await.unwrap();
    assert!(handle.state().is_running());
    assert!(read_log(&tmp.path().join("pg_ctl.log")).is_empty());
}

#[tokio::test]
async fn test_stop_without_marker_is_noop() {
    let tmp = tempfile::tempdir().unwrap();
    let handle = ProcessSupervisor::spawn(config(tmp.path()));

    handle.stop().await.unwrap();
    assert!(matches!(handle.state(), SupervisorState::Idle));
    assert!(read_log(&tmp.path().join("pg_ctl.log")).is_empty());
}

#[tokio::test]
async fn test_failed_start_is_terminal() {
    let tmp = tempfile::tempdir().unwrap();
    let handle = ProcessSupervisor::spawn(config(tmp.path()));
    fs::write(tmp.path().join("pg_ctl_fail_start"), "").unwrap();

    let err = handle.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StartFailed);
    assert!(err.kind().is_process());
    assert!(err.payload()["detail"].contains("could not bind"));
    assert!(handle.state().is_failed());

    // Fixing the cause does not revive this supervisor.
    fs::remove_file(tmp.path().join("pg_ctl_fail_start")).unwrap();
    let again = handle.start().await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::StartFailed);
    let stop = handle.stop().await.unwrap_err();
    assert_eq!(stop.kind(), ErrorKind::StartFailed);
    assert_eq!(read_log(&tmp.path().join("pg_ctl.log")).len(), 1);
}

#[tokio::test]
async fn test_failed_stop_keeps_marker() {
    let tmp = tempfile::tempdir().unwrap();
    let handle = ProcessSupervisor::spawn(config(tmp.path()));
    handle.start().await.unwrap();
    fs::write(tmp.path().join("pg_ctl_fail_stop"), "").unwrap();

    let err = handle.stop().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StopFailed);
    assert!(matches!(
        handle.state().failure().map(|e| e.kind()),
        Some(ErrorKind::StopFailed)
    ));
    assert!(marker(tmp.path()).is_file());
}

#[tokio::test]
async fn test_start_timeout_is_start_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    cfg.start_timeout = Duration::from_secs(1);
    fs::write(tmp.path().join("pg_ctl_slow"), "").unwrap();
    let handle = ProcessSupervisor::spawn(cfg);

    let err = handle.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StartFailed);
    assert!(err.payload()["detail"].contains("pg_ctl start did not finish within 1s"));
    assert!(!marker(tmp.path()).exists());
}

#[tokio::test]
async fn test_stop_timeout_is_reported_as_stop() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    cfg.start_timeout = Duration::from_secs(30);
    cfg.stop_timeout = Duration::from_secs(1);
    let handle = ProcessSupervisor::spawn(cfg);
    handle.start().await.unwrap();

    // Swap in a pg_ctl that hangs on every command.
    let slow = tmp.path().join("bin").join("pg_ctl");
    fs::write(&slow, "#!/bin/sh\nsleep 10\n").unwrap();

    let err = handle.stop().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StopFailed);
    assert!(err.payload()["detail"].contains("pg_ctl stop did not finish within 1s"));
}

#[tokio::test]
async fn test_missing_pg_ctl_is_start_failed() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config(tmp.path());
    cfg.pg_ctl = tmp.path().join("bin").join("no_such_pg_ctl");
    let handle = ProcessSupervisor::spawn(cfg);

    let err = handle.start().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StartFailed);
}

#[tokio::test]
async fn test_commands_run_in_arrival_order() {
    let tmp = tempfile::tempdir().unwrap();
    let handle = ProcessSupervisor::spawn(config(tmp.path()));

    let (started, stopped) = tokio::join!(handle.start(), handle.stop());
    started.unwrap();
    stopped.unwrap();

    assert!(matches!(handle.state(), SupervisorState::Idle));
    let log = read_log(&tmp.path().join("pg_ctl.log"));
    assert_eq!(log.len(), 2);
    assert!(log[0].starts_with("start"));
    assert!(log[1].starts_with("stop"));
}

#[tokio::test]
async fn test_external_changes_are_observed() {
    let tmp = tempfile::tempdir().unwrap();
    let handle = ProcessSupervisor::spawn(config(tmp.path()));
    handle.start().await.unwrap();

    fs::remove_file(marker(tmp.path())).unwrap();
    assert!(wait_until(|| matches!(handle.state(), SupervisorState::Idle)).await);

    fs::write(marker(tmp.path()), "1\n").unwrap();
    assert!(wait_until(|| handle.state().is_running()).await);
}

#[tokio::test]
async fn test_dropping_handles_leaves_server_running() {
    let tmp = tempfile::tempdir().unwrap();
    let handle = ProcessSupervisor::spawn(config(tmp.path()));
    let watcher = handle.clone();
    handle.start().await.unwrap();

    drop(handle);
    assert!(watcher.is_alive());
    drop(watcher);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(marker(tmp.path()).is_file());
    let log = read_log(&tmp.path().join("pg_ctl.log"));
    assert_eq!(log.len(), 1);
}
