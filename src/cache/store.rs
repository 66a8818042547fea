//! TTL-aware cache store over a pluggable backend.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use super::backend::{CacheEntry, StoreBackend};
use crate::error::StoreError;
use crate::key::{ResourceKey, TtlClass, KEY_NAMESPACE};

/// TTL per content class. Built from configuration at process start.
#[derive(Debug, Clone, Copy)]
pub struct TtlSchedule {
  pub list: Duration,
  pub detail: Duration,
  pub chapter_images: Duration,
}

impl TtlSchedule {
  pub fn ttl(&self, class: TtlClass) -> Duration {
    match class {
      TtlClass::List => self.list,
      TtlClass::Detail => self.detail,
      TtlClass::ChapterImages => self.chapter_images,
    }
  }
}

impl Default for TtlSchedule {
  fn default() -> Self {
    Self {
      list: Duration::seconds(300),
      detail: Duration::seconds(600),
      chapter_images: Duration::seconds(3600),
    }
  }
}

/// Cache store: computes expiry, enforces it on read, and owns explicit
/// invalidation. Entries are replaced wholesale, never mutated in place.
pub struct CacheStore {
  backend: Arc<dyn StoreBackend>,
  ttls: TtlSchedule,
}

impl CacheStore {
  pub fn new(backend: Arc<dyn StoreBackend>, ttls: TtlSchedule) -> Self {
    Self { backend, ttls }
  }

  /// Look up an unexpired entry. Expired entries read as absent even when
  /// the backend failed to evict them.
  pub async fn get(&self, key: &ResourceKey) -> Result<Option<CacheEntry>, StoreError> {
    let entry = self.backend.get(&key.storage_key()).await?;
    Ok(entry.filter(|e| !e.is_expired(Utc::now())))
  }

  /// Store `value` under `key` with the TTL of its content class,
  /// overwriting any prior entry.
  pub async fn put(
    &self,
    key: &ResourceKey,
    value: Vec<u8>,
    class: TtlClass,
  ) -> Result<(), StoreError> {
    let created_at = Utc::now();
    let ttl = self.ttls.ttl(class);
    let entry = CacheEntry {
      value,
      created_at,
      expires_at: created_at + ttl,
    };
    debug!(key = %key, ttl_secs = ttl.num_seconds(), "caching entry");
    self.backend.put(&key.storage_key(), entry).await
  }

  /// Evict one key. Idempotent: an absent key is a no-op.
  pub async fn invalidate(&self, key: &ResourceKey) -> Result<(), StoreError> {
    self.backend.delete(&key.storage_key()).await
  }

  /// Evict every key whose un-namespaced form starts with `prefix`
  /// (e.g. `"list:"`).
  pub async fn invalidate_prefix(&self, prefix: &str) -> Result<(), StoreError> {
    self
      .backend
      .delete_prefix(&format!("{KEY_NAMESPACE}{prefix}"))
      .await
  }

  /// Evict everything in this store's namespace. Used by the administrative
  /// cache-clear operation.
  pub async fn invalidate_all(&self) -> Result<(), StoreError> {
    debug!("invalidating entire cache namespace");
    self.backend.delete_prefix(KEY_NAMESPACE).await
  }
}
