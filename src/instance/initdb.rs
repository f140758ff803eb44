//! One-time data directory initialisation.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::time::Duration;

use crate::config::PgSettings;
use crate::error::{AppError, Result};
use crate::paths::PathLayout;
use crate::process::{log_output, output_detail, run_tool, RunError};

const INITDB_TIMEOUT: Duration = Duration::from_secs(300);

fn initdb_args(settings: &PgSettings, layout: &PathLayout, with_pwfile: bool) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-D".into(),
        layout.data.as_os_str().to_owned(),
        "--username".into(),
        settings.username.as_str().into(),
    ];
    if with_pwfile {
        let mut pwfile = OsString::from("--pwfile=");
        pwfile.push(layout.pwfile());
        args.push(pwfile);
        args.push("--auth=md5".into());
    }
    if let Some(locale) = &settings.locale {
        args.push(format!("--locale={locale}").into());
        args.push("--encoding=UTF8".into());
    }
    args
}

async fn write_pwfile(path: &Path, password: &str) -> Result<()> {
    tokio::fs::write(path, format!("{password}\n"))
        .await
        .map_err(|e| AppError::init_failed(format!("failed to write password file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt as _;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| AppError::init_failed(format!("failed to restrict password file: {e}")))?;
    }

    Ok(())
}

/// Run `initdb` unless the data directory already holds a cluster.
///
/// A directory without `PG_VERSION` is the remains of an interrupted run and
/// is removed first, since `initdb` refuses non-empty targets.
pub(super) async fn init_db(
    initdb: &Path,
    settings: &PgSettings,
    layout: &PathLayout,
) -> Result<()> {
    if layout.pg_version_file().is_file() {
        log::debug!("Data directory {:?} already initialised", layout.data);
        return Ok(());
    }

    match tokio::fs::remove_dir_all(&layout.data).await {
        Ok(()) => log::warn!("Removed half-initialised data directory {:?}", layout.data),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(AppError::init_failed(format!(
                "failed to clear {}: {e}",
                layout.data.display()
            )));
        }
    }

    let with_pwfile = !settings.password.is_empty();
    let pwfile = layout.pwfile();
    if with_pwfile {
        write_pwfile(&pwfile, &settings.password).await?;
    }

    log::info!("Initialising data directory {:?}", layout.data);
    let result = run_tool(
        initdb,
        initdb_args(settings, layout, with_pwfile),
        INITDB_TIMEOUT,
    )
    .await;

    if with_pwfile {
        if let Err(e) = tokio::fs::remove_file(&pwfile).await {
            log::warn!("Failed to remove password file {:?}: {}", pwfile, e);
        }
    }

    match result {
        Ok(output) if output.status.success() => log_output("initdb", &output),
        Ok(output) => {
            return Err(AppError::init_failed(format!(
                "initdb exited with {}: {}",
                output.status,
                output_detail(&output)
            )));
        }
        Err(RunError::Spawn(e)) => {
            return Err(AppError::init_failed(format!(
                "failed to run {}: {e}",
                initdb.display()
            )));
        }
        Err(RunError::TimedOut) => {
            return Err(AppError::init_failed(format!(
                "initdb did not finish within {}s",
                INITDB_TIMEOUT.as_secs()
            )));
        }
    }

    if !layout.pg_version_file().is_file() {
        return Err(AppError::init_failed(format!(
            "initdb succeeded but {} is missing",
            layout.pg_version_file().display()
        )));
    }
    Ok(())
}
