use std::io;
use std::path::{Path, PathBuf};

use super::{clamp_percent, DownloadKey, LedgerError, LedgerHandle, LedgerResult, ProgressLedger, ProgressRecord};
use crate::paths;

const STATUS_EXT: &str = ".status";
const CANCEL_EXT: &str = ".cancel";
const TMP_EXT: &str = ".tmp";

/// Ledger kept as plain files in the download status directory.
///
/// `<key>.status` holds the percentage as text. The cancel flag is a
/// separate `<key>.cancel` marker, so the transfer writing percentages
/// and the request setting the flag never rewrite each other's data.
pub struct FileLedger {
    dir: PathBuf,
}

impl FileLedger {
    pub fn new(dir: PathBuf) -> LedgerResult<Self> {
        paths::ensure_dir_exists(&dir)?;
        Ok(Self { dir })
    }

    fn status_path(&self, key: &DownloadKey) -> PathBuf {
        self.dir.join(format!("{}{}", key, STATUS_EXT))
    }

    fn cancel_path(&self, key: &DownloadKey) -> PathBuf {
        self.dir.join(format!("{}{}", key, CANCEL_EXT))
    }

    // Readers never observe a half-written status file.
    fn write_status(&self, key: &DownloadKey, percent: f64) -> io::Result<()> {
        let path = self.status_path(key);
        let tmp = self.dir.join(format!("{}{}{}", key, STATUS_EXT, TMP_EXT));
        std::fs::write(&tmp, percent.to_string())?;
        std::fs::rename(&tmp, &path)
    }

    fn read_record(&self, key: &DownloadKey) -> io::Result<Option<ProgressRecord>> {
        let text = match std::fs::read_to_string(self.status_path(key)) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        Ok(Some(ProgressRecord {
            percent: text.trim().parse().unwrap_or(0.0),
            canceled: self.cancel_path(key).exists(),
        }))
    }
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl ProgressLedger for FileLedger {
    fn begin(&self, key: &DownloadKey) -> LedgerResult<LedgerHandle> {
        remove_if_exists(&self.cancel_path(key))?;
        self.write_status(key, 0.0)?;
        tracing::debug!("[Ledger] Began {}", key);
        Ok(LedgerHandle { key: key.clone() })
    }

    // No-op once the record is gone; the next `is_canceled` reports it.
    fn update(&self, handle: &LedgerHandle, percent: f64) -> LedgerResult<()> {
        if !self.status_path(&handle.key).exists() {
            return Ok(());
        }
        self.write_status(&handle.key, clamp_percent(percent))?;
        Ok(())
    }

    fn cancel(&self, key: &DownloadKey) -> LedgerResult<()> {
        if !self.status_path(key).exists() {
            return Err(LedgerError::NotFound(key.to_string()));
        }
        std::fs::write(self.cancel_path(key), b"")?;
        Ok(())
    }

    fn peek(&self, key: &DownloadKey) -> LedgerResult<Option<ProgressRecord>> {
        Ok(self.read_record(key)?)
    }

    fn is_canceled(&self, handle: &LedgerHandle) -> LedgerResult<bool> {
        Ok(self
            .read_record(&handle.key)?
            .map_or(true, |record| record.canceled))
    }

    fn end(&self, handle: &LedgerHandle) -> LedgerResult<()> {
        remove_if_exists(&self.status_path(&handle.key))?;
        remove_if_exists(&self.cancel_path(&handle.key))?;
        tracing::debug!("[Ledger] Ended {}", handle.key);
        Ok(())
    }

    fn active(&self) -> LedgerResult<Vec<(String, ProgressRecord)>> {
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(key) = name.strip_suffix(STATUS_EXT) else {
                continue;
            };
            let key = DownloadKey(key.to_string());
            if let Some(record) = self.read_record(&key)? {
                records.push((key.0, record));
            }
        }
        records.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(records)
    }

    fn purge(&self) -> LedgerResult<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let is_ledger_file = [STATUS_EXT, CANCEL_EXT, TMP_EXT]
                .iter()
                .any(|ext| name.ends_with(ext));
            if is_ledger_file && path.is_file() && remove_if_exists(&path)? && name.ends_with(STATUS_EXT) {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
