/**
 * Download Engine
 *
 * Streams one remote file to disk in fixed-size chunks. After every
 * chunk the percentage goes to the ledger and the ledger's cancel flag
 * is re-read. Bytes land in `<dest>.part` and are renamed into place
 * only once the transfer is complete and the size checks out.
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use reqwest::Client;
use tokio::io::{AsyncWriteExt, BufWriter};

use super::DownloadError;
use crate::ledger::{DownloadKey, LedgerHandle, ProgressLedger};

/// How a fetch that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Completed { bytes: u64 },
    Canceled,
}

#[derive(Clone)]
pub struct DownloadEngine {
    client: Client,
    ledger: Arc<dyn ProgressLedger>,
    chunk_size: usize,
}

impl DownloadEngine {
    pub fn new(
        ledger: Arc<dyn ProgressLedger>,
        chunk_size: usize,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, DownloadError> {
        // Bounds each body read; a stalled upstream ends as Timeout.
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .build()
            .map_err(DownloadError::Client)?;

        Ok(Self {
            client,
            ledger,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn ledger(&self) -> &Arc<dyn ProgressLedger> {
        &self.ledger
    }

    /// Download `url` to `dest`, tracking progress under `key`.
    ///
    /// Cancellation is not an error: it returns `FetchOutcome::Canceled`.
    /// On every exit after the ledger record is created, the record is
    /// removed and nothing but a complete file is left at `dest`.
    pub async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        key: &DownloadKey,
    ) -> Result<FetchOutcome, DownloadError> {
        let handle = self.ledger.begin(key)?;
        let result = self.fetch_file(url, dest, &handle).await;
        self.finish(&handle, &result);
        result
    }

    /// Transfer one file under a record that is already live. The
    /// percentage restarts at 0; the record itself is left in place.
    pub async fn fetch_file(
        &self,
        url: &str,
        dest: &Path,
        handle: &LedgerHandle,
    ) -> Result<FetchOutcome, DownloadError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        self.ledger.update(handle, 0.0)?;

        let staging = staging_path(dest);
        tracing::info!("[Download] {}: {} -> {}", handle.key(), url, dest.display());

        let mut result = self.transfer(url, &staging, handle).await;
        if let Ok(FetchOutcome::Completed { .. }) = result {
            if let Err(e) = tokio::fs::rename(&staging, dest).await {
                result = Err(e.into());
            }
        }

        if !matches!(result, Ok(FetchOutcome::Completed { .. })) {
            remove_partial(&staging).await;
        }
        result
    }

    /// Drop the ledger record and log how the download ended.
    pub(crate) fn finish(&self, handle: &LedgerHandle, result: &Result<FetchOutcome, DownloadError>) {
        let key = handle.key();
        if let Err(e) = self.ledger.end(handle) {
            tracing::warn!("[Download] {}: failed to clear ledger record: {}", key, e);
        }

        match result {
            Ok(FetchOutcome::Completed { bytes }) => {
                tracing::info!("[Download] {}: finished ({} bytes)", key, bytes)
            }
            Ok(FetchOutcome::Canceled) => {
                tracing::info!("[Download] {}: canceled, partial file removed", key)
            }
            Err(e) => tracing::error!("[Download] {}: {:?}", key, e),
        }
    }

    async fn transfer(
        &self,
        url: &str,
        staging: &Path,
        handle: &LedgerHandle,
    ) -> Result<FetchOutcome, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(DownloadError::from_request)?
            .error_for_status()
            .map_err(DownloadError::Connection)?;

        // 0 means unknown: no percentages and no size check
        let total = response.content_length().unwrap_or(0);

        let mut file = BufWriter::new(tokio::fs::File::create(staging).await?);
        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;

        while let Some(item) = stream.next().await {
            let bytes = item.map_err(DownloadError::from_stream)?;

            for chunk in bytes.chunks(self.chunk_size) {
                file.write_all(chunk).await?;
                received += chunk.len() as u64;

                if total > 0 {
                    self.ledger
                        .update(handle, 100.0 * received as f64 / total as f64)?;
                }
                if self.ledger.is_canceled(handle)? {
                    tracing::info!("[Download] {}: cancel requested at {} bytes", handle.key(), received);
                    return Ok(FetchOutcome::Canceled);
                }
            }
        }

        file.flush().await?;
        verify_size(total, received)?;
        Ok(FetchOutcome::Completed { bytes: received })
    }
}

/// Sibling path the transfer writes to before the final rename
pub fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

/// A known total must match exactly; an unknown total (0) always passes.
pub fn verify_size(total: u64, received: u64) -> Result<(), DownloadError> {
    if total != 0 && received != total {
        return Err(DownloadError::SizeMismatch {
            expected: total,
            actual: received,
        });
    }
    Ok(())
}

async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("[Download] Failed to remove {}: {}", path.display(), e),
    }
}
