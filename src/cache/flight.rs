//! Single-flight guard for expensive per-key computations.
//!
//! The first caller for a key spawns the computation on the runtime and
//! every concurrent caller awaits the same published outcome, so N cold
//! requests for one key cost exactly one upstream fetch. Spawning also
//! means an abandoned caller never cancels the work: other waiters (and
//! the cache) still get the result.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::trace;

use crate::error::{RetrievalError, StoreError};

type Outcome<T> = Option<Result<T, RetrievalError>>;
type Registry<T> = Arc<Mutex<HashMap<String, watch::Receiver<Outcome<T>>>>>;

/// Arena of in-flight computations keyed by resource key. Entries are
/// removed as soon as the computation settles, so the map never grows past
/// the number of concurrently cold keys.
pub struct FlightGroup<T> {
  inflight: Registry<T>,
}

/// Removes a registry entry on drop, so the key is freed even when the
/// computation panics instead of settling. Without this, every later
/// caller would join a receiver whose sender is already gone.
struct Unregister<T> {
  registry: Registry<T>,
  key: String,
}

impl<T> Drop for Unregister<T> {
  fn drop(&mut self) {
    self
      .registry
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.key);
  }
}

impl<T> Default for FlightGroup<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> FlightGroup<T> {
  pub fn new() -> Self {
    Self {
      inflight: Arc::new(Mutex::new(HashMap::new())),
    }
  }
}

impl<T> FlightGroup<T>
where
  T: Clone + Send + Sync + 'static,
{
  /// Run `compute` for `key`, or wait on the computation already in flight
  /// for it. Every caller for the same key observes one consistent outcome.
  pub async fn run<F, Fut>(&self, key: &str, compute: F) -> Result<T, RetrievalError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, RetrievalError>> + Send + 'static,
  {
    let mut rx = {
      // A poisoned registry only means a publisher panicked while holding
      // the lock; the map contents are still usable for deduplication.
      let mut inflight = self
        .inflight
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

      if let Some(rx) = inflight.get(key) {
        trace!(key, "joining in-flight computation");
        rx.clone()
      } else {
        trace!(key, "starting computation");
        let (tx, rx) = watch::channel(None);
        inflight.insert(key.to_string(), rx.clone());

        let guard = Unregister {
          registry: Arc::clone(&self.inflight),
          key: key.to_string(),
        };
        let fut = compute();
        tokio::spawn(async move {
          let outcome = fut.await;
          // Unregister before publishing so a caller arriving after the
          // settle starts a fresh computation instead of a stale wait. A
          // panic in `fut` unwinds through the guard too, which keeps the
          // key usable; the waiters of the panicked flight see a dropped
          // sender.
          drop(guard);
          let _ = tx.send(Some(outcome));
        });

        rx
      }
    };

    let settled = rx.wait_for(|outcome| outcome.is_some()).await;
    match settled {
      Ok(guard) => match guard.as_ref() {
        Some(outcome) => outcome.clone(),
        // Unreachable: wait_for only returns on Some.
        None => Err(StoreError::Backend("in-flight computation vanished".into()).into()),
      },
      // The publisher task was torn down without sending (runtime shutdown).
      Err(_) => Err(StoreError::Backend("in-flight computation dropped".into()).into()),
    }
  }
}
