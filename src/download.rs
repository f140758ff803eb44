use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt as _;
use reqwest::Client;

use crate::error::{AppError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches a remote file to a local path.
///
/// Implementations must either leave a complete file at `dest` or no file at all.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// HTTP(S) fetcher backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| AppError::download(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        download_file(&self.client, url, dest).await
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.part", uuid::Uuid::new_v4().simple()));
    dest.with_file_name(name)
}

/// Stream `url` into `dest`.
///
/// Bytes go to a sibling `.part` file that is renamed onto `dest` only once the
/// body is complete, so an interrupted download never looks cached.
pub async fn download_file(client: &Client, url: &str, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| AppError::io(e.to_string()))?;
    }

    let part = part_path(dest);
    let result = stream_to(client, url, &part).await;
    match result {
        Ok(()) => fs::rename(&part, dest).map_err(|e| {
            let _ = fs::remove_file(&part);
            AppError::download_with_url(url, format!("failed to move download into place: {e}"))
        }),
        Err(e) => {
            if let Err(rm) = fs::remove_file(&part) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    log::warn!("Failed to remove partial download {:?}: {}", part, rm);
                }
            }
            Err(e)
        }
    }
}

async fn stream_to(client: &Client, url: &str, part: &Path) -> Result<()> {
    let resp = client
        .get(url)
        .header("User-Agent", "embedded-postgres")
        .send()
        .await
        .map_err(|e| AppError::download_with_url(url, e.to_string()))?;

    if !resp.status().is_success() {
        return Err(AppError::download_with_url(url, resp.status().to_string()));
    }

    let expected = resp.content_length();
    let mut file = fs::File::create(part).map_err(|e| AppError::io(e.to_string()))?;
    let mut written: u64 = 0;
    let mut stream = resp.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| AppError::download_with_url(url, e.to_string()))?;
        file.write_all(&chunk)
            .map_err(|e| AppError::io(e.to_string()))?;
        written += chunk.len() as u64;
    }
    file.sync_all().map_err(|e| AppError::io(e.to_string()))?;

    if let Some(expected) = expected {
        if written != expected {
            return Err(AppError::download_with_url(
                url,
                format!("truncated body: expected {expected} bytes, got {written}"),
            ));
        }
    }

    log::debug!("Downloaded {} ({} bytes)", url, written);
    Ok(())
}
