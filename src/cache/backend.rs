//! Backing-store traits for cache entries and rate-window counters.
//!
//! Both traits are object-safe seams so the pipeline can run against the
//! shared SQLite store in production and a plain map in tests.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::StoreError;

/// One stored cache entry. Owned by the store; replaced wholesale on
/// refresh, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub value: Vec<u8>,
  pub created_at: DateTime<Utc>,
  pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.expires_at <= now
  }
}

/// Key-value storage with per-entry expiry.
#[async_trait]
pub trait StoreBackend: Send + Sync {
  /// Look up an entry. May return an already-expired entry; logical expiry
  /// is enforced by the store layer on top.
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

  /// Store an entry, overwriting any prior value for the key.
  async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError>;

  /// Remove one key. A no-op when the key is absent.
  async fn delete(&self, key: &str) -> Result<(), StoreError>;

  /// Remove every key starting with `prefix`.
  async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError>;

  /// Liveness probe; a cheap round trip, nothing more.
  async fn ping(&self) -> Result<(), StoreError>;
}

/// Shared counter storage for fixed rate windows.
#[async_trait]
pub trait CounterBackend: Send + Sync {
  /// Atomically increment the counter for `key` within the window starting
  /// at `window_start`, and return the count after the increment.
  ///
  /// A row belonging to an older window is reset to 1 under the new window.
  /// The row's expiry equals the window length, so stale windows self-evict
  /// without a sweep process.
  async fn incr_window(
    &self,
    key: &str,
    window_start: DateTime<Utc>,
    window: Duration,
  ) -> Result<u32, StoreError>;

  /// Liveness probe for the counter store.
  async fn ping(&self) -> Result<(), StoreError>;
}
