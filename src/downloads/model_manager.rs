use std::path::PathBuf;

use super::{DownloadEngine, DownloadError, FetchOutcome};
use crate::catalog::CatalogEntry;
use crate::ledger::{DownloadKey, LedgerHandle};
use crate::store::ArtifactStore;

/// Download every file of a catalog entry into the store, one after the
/// other under a single ledger record.
///
/// The record lives from the first file to the last, so a cancel that
/// lands between two files is accepted and honoured. Progress is per
/// file: the percentage starts over at 0 for each one. A failure stops
/// the remaining files and keeps those already completed; a cancel also
/// removes the files this attempt completed.
pub async fn fetch_artifact(
    engine: &DownloadEngine,
    store: &ArtifactStore,
    entry: &CatalogEntry,
) -> Result<FetchOutcome, DownloadError> {
    let key = DownloadKey::for_feature(entry.feature, &entry.name);
    let handle = engine.ledger().begin(&key)?;

    let result = fetch_files(engine, store, entry, &handle).await;
    engine.finish(&handle, &result);

    if let Ok(FetchOutcome::Completed { .. }) = result {
        tracing::info!("[Download] {} ready at {}", key, store.path(entry).display());
    }
    result
}

async fn fetch_files(
    engine: &DownloadEngine,
    store: &ArtifactStore,
    entry: &CatalogEntry,
    handle: &LedgerHandle,
) -> Result<FetchOutcome, DownloadError> {
    let mut total: u64 = 0;
    let mut completed: Vec<PathBuf> = Vec::new();

    for (file, dest) in entry.files.iter().zip(store.file_paths(entry)) {
        let outcome = if engine.ledger().is_canceled(handle)? {
            FetchOutcome::Canceled
        } else {
            engine.fetch_file(&file.url, &dest, handle).await?
        };

        match outcome {
            FetchOutcome::Completed { bytes } => {
                total += bytes;
                completed.push(dest);
            }
            FetchOutcome::Canceled => {
                for path in &completed {
                    if let Err(e) = tokio::fs::remove_file(path).await {
                        tracing::warn!("[Download] Failed to remove {}: {}", path.display(), e);
                    }
                }
                return Ok(FetchOutcome::Canceled);
            }
        }
    }

    Ok(FetchOutcome::Completed { bytes: total })
}
