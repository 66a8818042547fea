//! Retrieval orchestration: cache-first, single-flight on miss.
//!
//! The orchestrator composes the fetcher, the cache store, and an
//! externally supplied parse step into one "get structured data for key"
//! operation. Failures are never cached: the next request for a failed key
//! retries fresh instead of replaying a pinned outage.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::cache::{CacheStore, FlightGroup};
use crate::error::{ParseError, RetrievalError, StoreError};
use crate::fetch::{Fetcher, RawPayload};
use crate::key::{ResourceKey, TtlClass};

/// Where a retrieved record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
  Cache,
  Upstream,
}

/// A retrieved record plus its origin, so the route layer can expose
/// cache-status headers and logs can tell hits from fetches.
#[derive(Debug, Clone)]
pub struct Retrieved<T> {
  pub record: T,
  pub origin: Origin,
}

/// Composes fetcher + cache + parse into resilient keyed retrieval.
pub struct Orchestrator {
  fetcher: Arc<Fetcher>,
  cache: Arc<CacheStore>,
  // The flight carries the origin alongside the bytes: a winner whose
  // re-check found the cache already filled reports Cache, not Upstream.
  flights: FlightGroup<(Vec<u8>, Origin)>,
}

impl Orchestrator {
  pub fn new(fetcher: Arc<Fetcher>, cache: Arc<CacheStore>) -> Self {
    Self {
      fetcher,
      cache,
      flights: FlightGroup::new(),
    }
  }

  /// Retrieve the record for `key`, fetching and parsing on a cache miss.
  ///
  /// Concurrent calls for the same cold key share one fetch via the
  /// single-flight group; the computation runs in a spawned task, so it
  /// settles (and caches) even if every caller is abandoned. The fetcher
  /// retries internally; this level makes exactly one attempt and surfaces
  /// the typed error.
  pub async fn retrieve<T, P>(
    &self,
    key: &ResourceKey,
    class: TtlClass,
    url: Url,
    parse: P,
  ) -> Result<Retrieved<T>, RetrievalError>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    P: FnOnce(RawPayload) -> Result<T, ParseError> + Send + 'static,
  {
    if let Some(entry) = self.cache.get(key).await? {
      debug!(key = %key, "cache hit");
      let record = decode(&entry.value)?;
      return Ok(Retrieved {
        record,
        origin: Origin::Cache,
      });
    }
    debug!(key = %key, "cache miss");

    let fetcher = Arc::clone(&self.fetcher);
    let cache = Arc::clone(&self.cache);
    let flight_key = key.clone();

    let (bytes, origin) = self
      .flights
      .run(key.as_str(), move || async move {
        // Re-check under the flight: a computation that settled between
        // our miss and winning the slot may have filled the cache.
        if let Some(entry) = cache.get(&flight_key).await? {
          return Ok((entry.value, Origin::Cache));
        }

        let raw = fetcher.fetch(&url).await.map_err(RetrievalError::Upstream)?;
        let record = parse(raw).map_err(RetrievalError::Parse)?;
        let bytes = encode(&record)?;

        // Cached before publishing, so waiters and late arrivals agree.
        cache.put(&flight_key, bytes.clone(), class).await?;
        Ok((bytes, Origin::Upstream))
      })
      .await?;

    let record = decode(&bytes)?;
    Ok(Retrieved { record, origin })
  }
}

fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, RetrievalError> {
  serde_json::to_vec(record)
    .map_err(|e| RetrievalError::Store(StoreError::Codec(e.to_string())))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RetrievalError> {
  serde_json::from_slice(bytes)
    .map_err(|e| RetrievalError::Store(StoreError::Codec(e.to_string())))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{MemoryBackend, TtlSchedule};
  use crate::error::FetchError;
  use crate::fetch::testing::ScriptedTransport;
  use crate::fetch::RetryPolicy;
  use chrono::Duration as ChronoDuration;
  use serde::Deserialize;
  use std::time::Duration;

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct PageRecord {
    titles: Vec<String>,
  }

  fn parse_titles(raw: RawPayload) -> Result<PageRecord, ParseError> {
    let text = String::from_utf8(raw).map_err(|e| ParseError(e.to_string()))?;
    if text.is_empty() {
      return Err(ParseError("empty page".into()));
    }
    Ok(PageRecord {
      titles: text.lines().map(String::from).collect(),
    })
  }

  fn url() -> Url {
    Url::parse("https://mangaaku.com/manga/?page=1").unwrap()
  }

  fn orchestrator(
    script: Vec<Result<RawPayload, FetchError>>,
    ttls: TtlSchedule,
    policy: RetryPolicy,
  ) -> (Arc<Orchestrator>, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(script));
    let fetcher = Arc::new(Fetcher::new(transport.clone(), policy));
    let cache = Arc::new(CacheStore::new(Arc::new(MemoryBackend::new()), ttls));
    (Arc::new(Orchestrator::new(fetcher, cache)), transport)
  }

  fn quick_policy() -> RetryPolicy {
    RetryPolicy {
      max_attempts: 1,
      backoff_base: Duration::from_millis(1),
      ..RetryPolicy::default()
    }
  }

  #[tokio::test]
  async fn test_hit_then_miss_after_ttl() {
    // List TTL of 80ms stands in for the 5 minute production value.
    let ttls = TtlSchedule {
      list: ChronoDuration::milliseconds(80),
      ..TtlSchedule::default()
    };
    let (orch, transport) = orchestrator(
      vec![Ok(b"one piece".to_vec()), Ok(b"one piece v2".to_vec())],
      ttls,
      quick_policy(),
    );
    let key = ResourceKey::list(1);

    // Cold: fetch + parse, served from upstream.
    let first = orch
      .retrieve(&key, TtlClass::List, url(), parse_titles)
      .await
      .unwrap();
    assert_eq!(first.origin, Origin::Upstream);
    assert_eq!(transport.calls(), 1);

    // Within TTL: same record, no fetcher involvement.
    let second = orch
      .retrieve(&key, TtlClass::List, url(), parse_titles)
      .await
      .unwrap();
    assert_eq!(second.origin, Origin::Cache);
    assert_eq!(second.record, first.record);
    assert_eq!(transport.calls(), 1);

    // Past TTL: a fresh fetch.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let third = orch
      .retrieve(&key, TtlClass::List, url(), parse_titles)
      .await
      .unwrap();
    assert_eq!(third.origin, Origin::Upstream);
    assert_eq!(third.record.titles, vec!["one piece v2".to_string()]);
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_concurrent_cold_retrieves_fetch_once() {
    let transport =
      Arc::new(ScriptedTransport::new(vec![Ok(b"shared page".to_vec())])
        .with_delay(Duration::from_millis(50)));
    let fetcher = Arc::new(Fetcher::new(transport.clone(), quick_policy()));
    let cache = Arc::new(CacheStore::new(
      Arc::new(MemoryBackend::new()),
      TtlSchedule::default(),
    ));
    let orch = Arc::new(Orchestrator::new(fetcher, cache));

    let mut handles = Vec::new();
    for _ in 0..10 {
      let orch = Arc::clone(&orch);
      handles.push(tokio::spawn(async move {
        orch
          .retrieve(&ResourceKey::list(1), TtlClass::List, url(), parse_titles)
          .await
      }));
    }

    let mut records = Vec::new();
    for handle in handles {
      records.push(handle.await.unwrap().unwrap().record);
    }
    // All callers observed the identical record from one upstream fetch.
    assert!(records.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test]
  async fn test_flight_recheck_reports_cache_origin() {
    use crate::cache::{CacheEntry, StoreBackend};
    use crate::error::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    // Reads as a miss exactly once, modelling another flight settling
    // between a caller's miss and it winning the flight slot.
    struct SecondLookBackend {
      inner: MemoryBackend,
      missed_once: AtomicBool,
    }

    #[async_trait]
    impl StoreBackend for SecondLookBackend {
      async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        if !self.missed_once.swap(true, Ordering::SeqCst) {
          return Ok(None);
        }
        self.inner.get(key).await
      }
      async fn put(&self, key: &str, entry: CacheEntry) -> Result<(), StoreError> {
        self.inner.put(key, entry).await
      }
      async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
      }
      async fn delete_prefix(&self, prefix: &str) -> Result<(), StoreError> {
        self.inner.delete_prefix(prefix).await
      }
      async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
      }
    }

    let transport = Arc::new(ScriptedTransport::new(Vec::new()));
    let fetcher = Arc::new(Fetcher::new(transport.clone(), quick_policy()));
    let cache = Arc::new(CacheStore::new(
      Arc::new(SecondLookBackend {
        inner: MemoryBackend::new(),
        missed_once: AtomicBool::new(false),
      }),
      TtlSchedule::default(),
    ));
    let key = ResourceKey::list(1);

    // Pre-populate the entry; the orchestrator's hit check will be the
    // one forced miss, and the flight re-check sees the real store.
    cache
      .put(
        &key,
        serde_json::to_vec(&PageRecord {
          titles: vec!["already here".to_string()],
        })
        .unwrap(),
        TtlClass::List,
      )
      .await
      .unwrap();

    let orch = Orchestrator::new(fetcher, cache);
    let got = orch
      .retrieve(&key, TtlClass::List, url(), parse_titles)
      .await
      .unwrap();

    // The winner's re-check found the entry: no fetch, and the origin
    // tells the truth about where the bytes came from.
    assert_eq!(got.origin, Origin::Cache);
    assert_eq!(got.record.titles, vec!["already here".to_string()]);
    assert_eq!(transport.calls(), 0);
  }

  #[tokio::test]
  async fn test_fetch_failure_is_not_cached() {
    let (orch, transport) = orchestrator(
      vec![
        Err(FetchError::Http { status: 503 }),
        Ok(b"recovered".to_vec()),
      ],
      TtlSchedule::default(),
      quick_policy(),
    );
    let key = ResourceKey::detail("one-piece");

    let err = orch
      .retrieve::<PageRecord, _>(&key, TtlClass::Detail, url(), parse_titles)
      .await
      .unwrap_err();
    assert!(matches!(
      err,
      RetrievalError::Upstream(FetchError::Http { status: 503 })
    ));

    // The failure was not cached: the next call fetches fresh and succeeds.
    let ok = orch
      .retrieve(&key, TtlClass::Detail, url(), parse_titles)
      .await
      .unwrap();
    assert_eq!(ok.record.titles, vec!["recovered".to_string()]);
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_parse_failure_is_not_cached() {
    let (orch, transport) = orchestrator(
      vec![Ok(Vec::new()), Ok(b"fixed markup".to_vec())],
      TtlSchedule::default(),
      quick_policy(),
    );
    let key = ResourceKey::chapter("one-piece-1");

    let err = orch
      .retrieve::<PageRecord, _>(&key, TtlClass::ChapterImages, url(), parse_titles)
      .await
      .unwrap_err();
    assert!(matches!(err, RetrievalError::Parse(_)));

    // Upstream content may self-correct; the next call parses fresh bytes.
    let ok = orch
      .retrieve(&key, TtlClass::ChapterImages, url(), parse_titles)
      .await
      .unwrap();
    assert_eq!(ok.record.titles, vec!["fixed markup".to_string()]);
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test]
  async fn test_exhausted_fetch_surfaces_upstream_error() {
    let policy = RetryPolicy {
      max_attempts: 2,
      backoff_base: Duration::from_millis(1),
      backoff_cap: Duration::from_millis(2),
      ..RetryPolicy::default()
    };
    let (orch, transport) = orchestrator(
      vec![
        Err(FetchError::Timeout { attempt: 1 }),
        Err(FetchError::Timeout { attempt: 2 }),
      ],
      TtlSchedule::default(),
      policy,
    );

    let err = orch
      .retrieve::<PageRecord, _>(
        &ResourceKey::list(9),
        TtlClass::List,
        url(),
        parse_titles,
      )
      .await
      .unwrap_err();
    match err {
      RetrievalError::Upstream(FetchError::Exhausted { attempts, .. }) => {
        assert_eq!(attempts, 2)
      }
      other => panic!("expected exhausted upstream error, got {other:?}"),
    }
    assert_eq!(transport.calls(), 2);
  }
}
