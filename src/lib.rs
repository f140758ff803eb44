//! Download, initialise and supervise a private PostgreSQL server.
//!
//! ```no_run
//! # async fn demo() -> embedded_postgres::Result<()> {
//! use embedded_postgres::{EmbeddedPostgres, PgSettings};
//!
//! let settings = PgSettings::new("/tmp/my-app-pg").with_port(0);
//! let mut pg = EmbeddedPostgres::new(settings)?;
//! pg.setup().await?;
//! pg.start().await?;
//! println!("{}", pg.connection_string());
//! pg.stop().await?;
//! # Ok(())
//! # }
//! ```

mod archive;
pub mod catalog;
mod config;
mod download;
mod error;
mod instance;
mod options;
mod paths;
pub mod platform;
mod process;
mod provision;

pub use catalog::PgVersion;
pub use config::{PgSettings, DEFAULT_PORT};
pub use download::{download_file, Fetch, HttpFetcher};
pub use error::{AppError, ErrorKind, Result};
pub use instance::{EmbeddedPostgres, InstanceStatus};
pub use options::encode_options;
pub use paths::{resolve, PathLayout, MARKER_FILE, PG_VERSION_FILE};
pub use platform::Platform;
pub use process::{
    is_process_alive, marker_present, read_marker_pid, ProcessSupervisor, SupervisorCommand,
    SupervisorConfig, SupervisorHandle, SupervisorState, DEFAULT_STOP_TIMEOUT,
};
pub use provision::{BinaryProvisioner, PgBinaries};
