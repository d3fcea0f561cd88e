use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use super::{clamp_percent, DownloadKey, LedgerError, LedgerHandle, LedgerResult, ProgressLedger, ProgressRecord};

/// Ledger stored in a SQLite database in WAL mode, shared by every
/// process that opens the same file.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> LedgerResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    pub fn in_memory() -> LedgerResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> LedgerResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS downloads (
                key TEXT PRIMARY KEY,
                percent REAL NOT NULL DEFAULT 0,
                canceled INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
        "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ProgressLedger for SqliteLedger {
    fn begin(&self, key: &DownloadKey) -> LedgerResult<LedgerHandle> {
        self.conn().execute(
            "INSERT INTO downloads (key, percent, canceled, updated_at)
             VALUES (?1, 0, 0, ?2)
             ON CONFLICT(key) DO UPDATE SET percent = 0, canceled = 0, updated_at = ?2",
            params![key.as_str(), Utc::now().to_rfc3339()],
        )?;
        tracing::debug!("[Ledger] Began {}", key);
        Ok(LedgerHandle { key: key.clone() })
    }

    fn update(&self, handle: &LedgerHandle, percent: f64) -> LedgerResult<()> {
        self.conn().execute(
            "UPDATE downloads SET percent = ?1, updated_at = ?2 WHERE key = ?3",
            params![clamp_percent(percent), Utc::now().to_rfc3339(), handle.key.as_str()],
        )?;
        Ok(())
    }

    fn cancel(&self, key: &DownloadKey) -> LedgerResult<()> {
        let changed = self.conn().execute(
            "UPDATE downloads SET canceled = 1, updated_at = ?1 WHERE key = ?2",
            params![Utc::now().to_rfc3339(), key.as_str()],
        )?;
        if changed == 0 {
            return Err(LedgerError::NotFound(key.to_string()));
        }
        Ok(())
    }

    fn peek(&self, key: &DownloadKey) -> LedgerResult<Option<ProgressRecord>> {
        let record = self
            .conn()
            .query_row(
                "SELECT percent, canceled FROM downloads WHERE key = ?1",
                params![key.as_str()],
                |row| {
                    Ok(ProgressRecord {
                        percent: row.get(0)?,
                        canceled: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn is_canceled(&self, handle: &LedgerHandle) -> LedgerResult<bool> {
        Ok(self.peek(&handle.key)?.map_or(true, |record| record.canceled))
    }

    fn end(&self, handle: &LedgerHandle) -> LedgerResult<()> {
        self.conn()
            .execute("DELETE FROM downloads WHERE key = ?1", params![handle.key.as_str()])?;
        tracing::debug!("[Ledger] Ended {}", handle.key);
        Ok(())
    }

    fn active(&self) -> LedgerResult<Vec<(String, ProgressRecord)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key, percent, canceled FROM downloads ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                ProgressRecord {
                    percent: row.get(1)?,
                    canceled: row.get(2)?,
                },
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn purge(&self) -> LedgerResult<usize> {
        Ok(self.conn().execute("DELETE FROM downloads", [])?)
    }
}
