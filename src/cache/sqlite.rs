//! SQLite backend for cache entries and rate-window counters.
//!
//! A single database file is shared by every worker process, which is what
//! lets the rate limiter count requests across processes. Expiry is stored
//! per row; reads treat expired rows as absent and writes opportunistically
//! sweep them, so no separate reaper is needed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use super::backend::{CacheEntry, CounterBackend, StoreBackend};
use crate::error::StoreError;

/// SQLite-backed store. The connection is guarded by a mutex; every
/// statement runs while holding it, which makes increment-and-check on a
/// rate window a single atomic operation.
pub struct SqliteBackend {
  conn: Mutex<Connection>,
}

impl SqliteBackend {
  /// Open (or create) the database at `path` and run migrations.
  pub fn open(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| StoreError::Backend(format!("failed to create cache directory: {e}")))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| StoreError::Backend(format!("failed to open {}: {e}", path.display())))?;

    Self::from_connection(conn)
  }

  /// Open the database at the default per-user location.
  pub fn open_default() -> Result<Self, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Backend("could not determine data directory".into()))?;

    Self::open(&data_dir.join("mangaku").join("cache.db"))
  }

  /// Private in-memory database; used by the testing profile.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    let conn = Connection::open_in_memory()?;
    Self::from_connection(conn)
  }

  fn from_connection(conn: Connection) -> Result<Self, StoreError> {
    // Cross-process writers contend on the file; give them time to queue
    // instead of failing with SQLITE_BUSY.
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.execute_batch(SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
    self
      .conn
      .lock()
      .map_err(|_| StoreError::Backend("connection lock poisoned".into()))
  }
}

const SCHEMA: &str = r#"
-- Cache entries; values are opaque serialized records.
CREATE TABLE IF NOT EXISTS cache_entry (
    key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_entry_expires ON cache_entry(expires_at);

-- Fixed rate windows; one row per (client, endpoint class).
CREATE TABLE IF NOT EXISTS rate_window (
    key TEXT PRIMARY KEY,
    window_start TEXT NOT NULL,
    count INTEGER NOT NULL,
    expires_at TEXT NOT NULL
);
"#;

#[async_trait]
impl StoreBackend for SqliteBackend {
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
    let conn = self.lock()?;

    let row: Option<(Vec<u8>, String, String)> = conn
      .query_row(
        "SELECT value, created_at, expires_at FROM cache_entry WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .map(Some)
      .or_else(ignore_not_found)?;

    let Some((value, created_at, expires_at)) = row else {
      return Ok(None);
    };

    let entry = CacheEntry {
      value,
      created_at: parse_datetime(&created_at)?,
      expires_at: parse_datetime(&expires_at)?,
    };

    // Lazy expiry: drop the row on first read past its deadline.
    if entry.is_expired(Utc::now()) {
      conn.execute("DELETE FROM cache_entry WHERE key = ?", params![key])?;
      return Ok(None);
    }

    Ok(Some(entry))
  }

  async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError> {
    let conn = self.lock()?;

    conn.execute(
      "INSERT OR REPLACE INTO cache_entry (key, value, created_at, expires_at)
       VALUES (?, ?, ?, ?)",
      params![
        key,
        entry.value,
        entry.created_at.to_rfc3339(),
        entry.expires_at.to_rfc3339()
      ],
    )?;

    // Opportunistic sweep keeps the file from accumulating dead rows.
    conn.execute(
      "DELETE FROM cache_entry WHERE expires_at <= ?",
      params![Utc::now().to_rfc3339()],
    )?;

    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.execute("DELETE FROM cache_entry WHERE key = ?", params![key])?;
    Ok(())
  }

  async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
    let conn = self.lock()?;
    // LIKE with escaped wildcards so a literal % or _ in a key can't widen
    // the deletion.
    let pattern = format!(
      "{}%",
      prefix.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
    );
    conn.execute(
      "DELETE FROM cache_entry WHERE key LIKE ? ESCAPE '\\'",
      params![pattern],
    )?;
    Ok(())
  }

  async fn ping(&self) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.query_row("SELECT 1", [], |_| Ok(()))?;
    Ok(())
  }
}

#[async_trait]
impl CounterBackend for SqliteBackend {
  async fn incr_window(
    &self,
    key: &str,
    window_start: DateTime<Utc>,
    window: Duration,
  ) -> Result<u32, StoreError> {
    let conn = self.lock()?;
    let start = window_start.to_rfc3339();
    let expires_at = (window_start + window).to_rfc3339();

    // Single UPSERT: the CASE sees the pre-update row, so an increment
    // within the same window and a reset into a new window are both one
    // atomic statement.
    let count: u32 = conn.query_row(
      "INSERT INTO rate_window (key, window_start, count, expires_at)
       VALUES (?1, ?2, 1, ?3)
       ON CONFLICT(key) DO UPDATE SET
         count = CASE
           WHEN rate_window.window_start = excluded.window_start
           THEN rate_window.count + 1
           ELSE 1
         END,
         window_start = excluded.window_start,
         expires_at = excluded.expires_at
       RETURNING count",
      params![key, start, expires_at],
      |row| row.get(0),
    )?;

    // Expired windows from idle clients are harmless but pile up; sweep
    // them while we hold the lock anyway.
    conn.execute(
      "DELETE FROM rate_window WHERE expires_at <= ?",
      params![Utc::now().to_rfc3339()],
    )?;

    Ok(count)
  }

  async fn ping(&self) -> Result<(), StoreError> {
    let conn = self.lock()?;
    conn.query_row("SELECT 1", [], |_| Ok(()))?;
    Ok(())
  }
}

fn ignore_not_found<T>(e: rusqlite::Error) -> Result<Option<T>, StoreError> {
  match e {
    rusqlite::Error::QueryReturnedNoRows => Ok(None),
    other => Err(other.into()),
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| StoreError::Backend(format!("bad timestamp '{s}': {e}")))
}
