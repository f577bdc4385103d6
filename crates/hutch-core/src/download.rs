//! Archive download with mirror fallback, retry/backoff, and signature checks.
//!
//! Every candidate URL gets a bounded number of attempts with exponential
//! backoff; each attempt runs under a hard timeout. A file whose leading
//! bytes match no known archive signature is deleted and counts as a
//! retryable failure, advancing to the next mirror.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::StreamExt;
use reqwest::Client;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::extract::ArchiveFormat;
use crate::reporter::Reporter;

const RETRY_COUNT: usize = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];
const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];
const USTAR_OFFSET: usize = 257;

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0} does not look like a supported archive")]
    BadSignature(PathBuf),

    #[error("all download sources failed for {domain}: {last}")]
    Exhausted { domain: String, last: String },
}

/// One downloadable archive location with its expected format.
#[derive(Debug, Clone)]
pub struct DownloadCandidate {
    pub url: String,
    pub format: ArchiveFormat,
}

#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new() -> Result<Self, DownloadError> {
        let client = Client::builder().user_agent(crate::USER_AGENT).build()?;
        Ok(Self { client })
    }

    /// Fetch the first candidate that yields a valid archive at `dest`.
    pub async fn fetch(
        &self,
        domain: &str,
        version: &str,
        candidates: &[DownloadCandidate],
        dest: &Path,
        reporter: &dyn Reporter,
    ) -> Result<DownloadCandidate, DownloadError> {
        let mut last_err: Option<DownloadError> = None;

        for candidate in candidates {
            let mut backoff = RETRY_BACKOFF;
            for attempt in 0..RETRY_COUNT {
                if attempt > 0 {
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                match self
                    .attempt(domain, version, candidate, dest, reporter)
                    .await
                {
                    Ok(()) => return Ok(candidate.clone()),
                    Err(err) => {
                        tracing::debug!(
                            url = %candidate.url,
                            attempt,
                            %err,
                            "download attempt failed"
                        );
                        last_err = Some(err);
                    }
                }
            }
        }

        Err(DownloadError::Exhausted {
            domain: domain.to_string(),
            last: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no candidate urls".to_string()),
        })
    }

    async fn attempt(
        &self,
        domain: &str,
        version: &str,
        candidate: &DownloadCandidate,
        dest: &Path,
        reporter: &dyn Reporter,
    ) -> Result<(), DownloadError> {
        let stream = self.stream_to(domain, version, &candidate.url, dest, reporter);
        match tokio::time::timeout(ATTEMPT_TIMEOUT, stream).await {
            Ok(res) => res?,
            Err(_) => {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(DownloadError::Timeout(ATTEMPT_TIMEOUT));
            }
        }
        validate_archive(dest).await
    }

    async fn stream_to(
        &self,
        domain: &str,
        version: &str,
        url: &str,
        dest: &Path,
        reporter: &dyn Reporter,
    ) -> Result<(), DownloadError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let total = response.content_length();

        let mut file = File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        let mut last_report = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            // Throttled: not every chunk is worth a repaint
            if last_report.elapsed() >= PROGRESS_INTERVAL {
                reporter.downloading(domain, version, downloaded, total);
                last_report = Instant::now();
            }
        }

        file.flush().await?;
        reporter.downloading(domain, version, downloaded, total);
        Ok(())
    }
}

/// Validate the leading bytes of `path` against the known archive
/// signatures (gzip, xz, or a `ustar` marker at tar offset 257). Invalid
/// files are deleted before the error is returned.
pub async fn validate_archive(path: &Path) -> Result<(), DownloadError> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut head = [0u8; USTAR_OFFSET + 5];
    let mut filled = 0;
    loop {
        let n = file.read(&mut head[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
        if filled == head.len() {
            break;
        }
    }

    if has_archive_signature(&head[..filled]) {
        Ok(())
    } else {
        let _ = tokio::fs::remove_file(path).await;
        Err(DownloadError::BadSignature(path.to_path_buf()))
    }
}

pub(crate) fn has_archive_signature(head: &[u8]) -> bool {
    if head.starts_with(&GZIP_MAGIC) || head.starts_with(&XZ_MAGIC) {
        return true;
    }
    head.len() >= USTAR_OFFSET + 5 && &head[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar"
}
