#![allow(dead_code)]

use std::io::{Cursor, Write as _};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use embedded_postgres::catalog::inner_archive_name;
use embedded_postgres::{AppError, Fetch, Platform, Result};

/// Records its arguments, honours `initdb_fail` in the base directory, and
/// leaves a half-written data directory behind when it fails.
pub const FAKE_INITDB: &str = r#"#!/bin/sh
data=""
pwfile=""
while [ $# -gt 0 ]; do
  case "$1" in
    -D) data="$2"; shift 2 ;;
    --pwfile=*) pwfile="${1#--pwfile=}"; shift ;;
    *) shift ;;
  esac
done
mkdir -p "$data" || exit 1
base="$(dirname "$data")"
echo "run" >> "$base/initdb.log"
if [ -f "$base/initdb_fail" ]; then
  touch "$data/half-written"
  echo "initdb: error: invalid locale settings" >&2
  exit 1
fi
if [ -n "$pwfile" ]; then
  cp "$pwfile" "$data/pwfile.seen" || exit 1
fi
echo "16" > "$data/PG_VERSION"
echo "Success. You can now start the database server."
"#;

/// Writes and removes `postmaster.pid` like the real tool. Every call is
/// appended to `pg_ctl.log` in the base directory, and the flag files
/// `pg_ctl_fail_start`, `pg_ctl_fail_stop`, `pg_ctl_slow` and `pg_ctl_daemon`
/// there change its behaviour. With `pg_ctl_daemon` a background child keeps
/// the inherited stdout open after `start` returns, as the real postmaster does.
pub const FAKE_PG_CTL: &str = r#"#!/bin/sh
cmd="$1"
shift
data=""
options=""
while [ $# -gt 0 ]; do
  case "$1" in
    -D) data="$2"; shift 2 ;;
    -o) options="$2"; shift 2 ;;
    -l) shift 2 ;;
    *) shift ;;
  esac
done
base="$(dirname "$data")"
echo "$cmd $options" >> "$base/pg_ctl.log"
case "$cmd" in
  start)
    if [ -f "$base/pg_ctl_slow" ]; then sleep 10; fi
    if [ -f "$base/pg_ctl_fail_start" ]; then
      echo "could not bind IPv4 address" >&2
      exit 1
    fi
    if [ -f "$base/pg_ctl_daemon" ]; then
      ( sleep 20; echo "daemon exiting" ) &
    fi
    printf '%s\n%s\n' "$PPID" "$data" > "$data/postmaster.pid"
    echo "server started"
    ;;
  stop)
    if [ -f "$base/pg_ctl_fail_stop" ]; then
      echo "server does not shut down" >&2
      exit 1
    fi
    rm -f "$data/postmaster.pid"
    echo "server stopped"
    ;;
esac
exit 0
"#;

#[cfg(windows)]
pub const INITDB_ENTRY: &str = "bin/initdb.exe";
#[cfg(not(windows))]
pub const INITDB_ENTRY: &str = "bin/initdb";
#[cfg(windows)]
pub const PG_CTL_ENTRY: &str = "bin/pg_ctl.exe";
#[cfg(not(windows))]
pub const PG_CTL_ENTRY: &str = "bin/pg_ctl";

/// One entry of a fixture tarball.
pub enum Entry<'a> {
    Dir(&'a str),
    File(&'a str, &'a [u8], u32),
    Symlink(&'a str, &'a str),
    /// Name written verbatim, bypassing the builder's own path checks.
    RawFile(&'a str, &'a [u8]),
}

pub fn build_txz(entries: &[Entry<'_>]) -> Vec<u8> {
    let encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
    let mut builder = tar::Builder::new(encoder);
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        match entry {
            Entry::Dir(path) => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_mode(0o755);
                header.set_size(0);
                builder
                    .append_data(&mut header, path, std::io::empty())
                    .unwrap();
            }
            Entry::File(path, data, mode) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(*mode);
                header.set_size(data.len() as u64);
                builder.append_data(&mut header, path, *data).unwrap();
            }
            Entry::Symlink(path, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                builder.append_link(&mut header, path, target).unwrap();
            }
            Entry::RawFile(name, data) => {
                let bytes = name.as_bytes();
                header.as_old_mut().name[..bytes.len()].copy_from_slice(bytes);
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(0o644);
                header.set_size(data.len() as u64);
                header.set_cksum();
                builder.append(&header, *data).unwrap();
            }
        }
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Entries of a minimal server tree with the fake tools.
pub fn server_tree() -> Vec<Entry<'static>> {
    let mut entries = vec![
        Entry::Dir("bin/"),
        Entry::Dir("lib/"),
        Entry::File(INITDB_ENTRY, FAKE_INITDB.as_bytes(), 0o755),
        Entry::File(PG_CTL_ENTRY, FAKE_PG_CTL.as_bytes(), 0o755),
        Entry::File("lib/libpq.so.5.16", b"\x7fELF", 0o644),
    ];
    if cfg!(unix) {
        entries.push(Entry::Symlink("lib/libpq.so.5", "libpq.so.5.16"));
    }
    entries
}

/// A zonky-style jar: a manifest plus the platform tarball at its root.
pub fn build_jar(inner_name: &str, txz: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    writer.start_file("META-INF/MANIFEST.MF", options).unwrap();
    writer.write_all(b"Manifest-Version: 1.0\n").unwrap();
    writer.start_file(inner_name, options).unwrap();
    writer.write_all(txz).unwrap();
    writer.finish().unwrap().into_inner()
}

/// Write a jar for the current platform into `dir` and return its path.
pub fn write_fixture_jar(dir: &Path, entries: &[Entry<'_>]) -> PathBuf {
    let platform = Platform::current().unwrap();
    let jar = build_jar(&inner_archive_name(&platform), &build_txz(entries));
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("fixture.jar");
    std::fs::write(&path, jar).unwrap();
    path
}

/// Serves a local file in place of the Maven repository.
pub struct FixtureFetch {
    source: PathBuf,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl FixtureFetch {
    pub fn new(source: PathBuf) -> Self {
        Self::failing_first(source, 0)
    }

    /// Fail the first `failures` calls without writing anything.
    pub fn failing_first(source: PathBuf, failures: usize) -> Self {
        Self {
            source,
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetch for FixtureFetch {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::download_with_url(url, "connection reset by peer"));
        }
        tokio::fs::copy(&self.source, dest).await?;
        Ok(())
    }
}

pub fn read_log(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}
