//! In-memory backend for tests and the testing profile.
//!
//! A single mutex guards each map, so increment-and-check on a rate window
//! is atomic by construction.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::backend::{CacheEntry, CounterBackend, StoreBackend};
use crate::error::StoreError;

#[derive(Debug, Clone)]
struct WindowRow {
  window_start: DateTime<Utc>,
  count: u32,
  expires_at: DateTime<Utc>,
}

/// Map-backed store; not shared across processes.
#[derive(Default)]
pub struct MemoryBackend {
  entries: Mutex<HashMap<String, CacheEntry>>,
  windows: Mutex<HashMap<String, WindowRow>>,
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }
}

fn poisoned(what: &str) -> StoreError {
  StoreError::Backend(format!("{what} lock poisoned"))
}

#[async_trait]
impl StoreBackend for MemoryBackend {
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
    let mut entries = self.entries.lock().map_err(|_| poisoned("entries"))?;
    // Lazy expiry: drop the row on first read past its deadline.
    if let Some(entry) = entries.get(key) {
      if entry.is_expired(Utc::now()) {
        entries.remove(key);
        return Ok(None);
      }
      return Ok(Some(entry.clone()));
    }
    Ok(None)
  }

  async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| poisoned("entries"))?;
    entries.insert(key.to_string(), entry);
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| poisoned("entries"))?;
    entries.remove(key);
    Ok(())
  }

  async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
    let mut entries = self.entries.lock().map_err(|_| poisoned("entries"))?;
    entries.retain(|key, _| !key.starts_with(prefix));
    Ok(())
  }

  async fn ping(&self) -> Result<(), StoreError> {
    self.entries.lock().map_err(|_| poisoned("entries"))?;
    Ok(())
  }
}

#[async_trait]
impl CounterBackend for MemoryBackend {
  async fn incr_window(
    &self,
    key: &str,
    window_start: DateTime<Utc>,
    window: Duration,
  ) -> Result<u32, StoreError> {
    let mut windows = self.windows.lock().map_err(|_| poisoned("windows"))?;
    let expires_at = window_start + window;
    let row = windows
      .entry(key.to_string())
      .and_modify(|row| {
        if row.window_start == window_start && row.expires_at > Utc::now() {
          row.count += 1;
        } else {
          // A new window has begun; the old count no longer applies.
          row.window_start = window_start;
          row.count = 1;
          row.expires_at = expires_at;
        }
      })
      .or_insert(WindowRow {
        window_start,
        count: 1,
        expires_at,
      });
    Ok(row.count)
  }

  async fn ping(&self) -> Result<(), StoreError> {
    self.windows.lock().map_err(|_| poisoned("windows"))?;
    Ok(())
  }
}
