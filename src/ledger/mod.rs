/**
 * Progress Ledger
 *
 * Durable per-download record of the current percentage and the
 * cancellation flag. Lives outside the process memory so that a cancel
 * request served by one worker is seen by the transfer running in
 * another.
 */

mod file;
mod sqlite;

pub use file::FileLedger;
pub use sqlite::SqliteLedger;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::catalog::Feature;
use crate::config::{Config, LedgerBackend};
use crate::paths;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Download {0} is not active")]
    NotFound(String),

    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Identifies one logical download. The string form is filesystem-safe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DownloadKey(String);

impl DownloadKey {
    pub fn new(feature: &str, model: &str) -> Self {
        Self(format!("{}_{}", sanitize(feature), sanitize(model)))
    }

    pub fn for_feature(feature: Feature, model: &str) -> Self {
        Self::new(feature.name(), model)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DownloadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Anything outside [A-Za-z0-9._-] becomes '_', and a leading dot is
// escaped so no key names a hidden or relative path component.
fn sanitize(part: &str) -> String {
    let mut out: String = part
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.starts_with('.') {
        out.replace_range(0..1, "_");
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub percent: f64,
    pub canceled: bool,
}

impl ProgressRecord {
    pub fn fresh() -> Self {
        Self {
            percent: 0.0,
            canceled: false,
        }
    }
}

/// Returned by `begin`; held by the transfer for its lifetime.
#[derive(Debug, Clone)]
pub struct LedgerHandle {
    key: DownloadKey,
}

impl LedgerHandle {
    pub fn key(&self) -> &DownloadKey {
        &self.key
    }
}

pub trait ProgressLedger: Send + Sync {
    /// Create or reset the record for `key` to 0% and not canceled.
    fn begin(&self, key: &DownloadKey) -> LedgerResult<LedgerHandle>;

    /// Set the percentage, clamped to [0, 100]. Last write wins.
    fn update(&self, handle: &LedgerHandle, percent: f64) -> LedgerResult<()>;

    /// Flag an existing record as canceled, `NotFound` if there is none.
    fn cancel(&self, key: &DownloadKey) -> LedgerResult<()>;

    fn peek(&self, key: &DownloadKey) -> LedgerResult<Option<ProgressRecord>>;

    /// Re-reads the durable flag. A missing record counts as canceled.
    fn is_canceled(&self, handle: &LedgerHandle) -> LedgerResult<bool>;

    /// Delete the record. Absence is not an error.
    fn end(&self, handle: &LedgerHandle) -> LedgerResult<()>;

    /// Every live record, ordered by key
    fn active(&self) -> LedgerResult<Vec<(String, ProgressRecord)>>;

    /// Drop all records; returns how many were removed.
    fn purge(&self) -> LedgerResult<usize>;
}

pub fn clamp_percent(percent: f64) -> f64 {
    if percent.is_nan() {
        0.0
    } else {
        percent.clamp(0.0, 100.0)
    }
}

/// Open the ledger backend selected by the config.
pub fn open(config: &Config) -> LedgerResult<Arc<dyn ProgressLedger>> {
    let ledger: Arc<dyn ProgressLedger> = match config.ledger {
        LedgerBackend::File => Arc::new(FileLedger::new(config.download_status_dir())?),
        LedgerBackend::Sqlite => Arc::new(SqliteLedger::open(&paths::ledger_db_path(&config.config_dir))?),
    };
    Ok(ledger)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_format() {
        assert_eq!(DownloadKey::new("transcribe", "small").as_str(), "transcribe_small");
        assert_eq!(
            DownloadKey::for_feature(Feature::Translate, "opus-mt-fr-en").to_string(),
            "translate_opus-mt-fr-en"
        );
    }

    #[test]
    fn test_key_strips_path_separators() {
        let key = DownloadKey::new("transcribe", "../../etc/passwd");
        assert!(!key.as_str().contains('/'));
        assert_eq!(key.as_str(), "transcribe__._.._etc_passwd");

        let key = DownloadKey::new("..", "a\\b");
        assert_eq!(key.as_str(), "_._a_b");
    }

    #[test]
    fn test_clamp_percent() {
        assert_eq!(clamp_percent(-3.0), 0.0);
        assert_eq!(clamp_percent(42.5), 42.5);
        assert_eq!(clamp_percent(180.0), 100.0);
        assert_eq!(clamp_percent(f64::NAN), 0.0);
    }
}
