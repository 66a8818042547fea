//! Assembly of the pipeline from configuration.
//!
//! The route layer holds one `Pipeline` and calls into its parts; nothing
//! here reaches for global state, so tests can assemble the same shape
//! over in-memory backends.

use color_eyre::Result;
use std::sync::Arc;

use crate::cache::{CacheStore, MemoryBackend, SqliteBackend};
use crate::config::Config;
use crate::fetch::Fetcher;
use crate::health::HealthReporter;
use crate::limit::RateLimiter;
use crate::retrieve::Orchestrator;

/// The wired-up retrieval core: orchestrator, limiter, health reporter,
/// and direct handles for administrative operations.
pub struct Pipeline {
  pub orchestrator: Orchestrator,
  pub limiter: RateLimiter,
  pub health: HealthReporter,
  pub cache: Arc<CacheStore>,
  pub fetcher: Arc<Fetcher>,
}

impl Pipeline {
  /// Production wiring: SQLite backing store shared across processes.
  pub fn from_config(config: &Config) -> Result<Self> {
    let backend = Arc::new(match &config.cache.database {
      Some(path) => SqliteBackend::open(path)?,
      None => SqliteBackend::open_default()?,
    });
    Self::over_backend(config, backend.clone(), backend)
  }

  /// Test/dev wiring: everything in memory, no file, no network pool reuse
  /// across processes.
  pub fn in_memory(config: &Config) -> Result<Self> {
    let backend = Arc::new(MemoryBackend::new());
    Self::over_backend(config, backend.clone(), backend)
  }

  fn over_backend(
    config: &Config,
    store: Arc<dyn crate::cache::StoreBackend>,
    counters: Arc<dyn crate::cache::CounterBackend>,
  ) -> Result<Self> {
    let fetcher = Arc::new(Fetcher::over_http(
      &config.upstream.user_agent,
      config.upstream.pool_max_idle_per_host,
      config.retry.policy(),
    )?);

    let cache = Arc::new(CacheStore::new(store.clone(), config.cache.ttls()));
    let limiter = RateLimiter::new(counters.clone(), config.rate.limits());
    let health = HealthReporter::new(store, counters);
    let orchestrator = Orchestrator::new(fetcher.clone(), cache.clone());

    Ok(Self {
      orchestrator,
      limiter,
      health,
      cache,
      fetcher,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::key::EndpointClass;

  #[tokio::test]
  async fn test_in_memory_pipeline_wires_up() {
    let pipeline = Pipeline::in_memory(&Config::testing()).unwrap();

    let status = pipeline.health.status().await;
    assert!(status.is_healthy());

    let decision = pipeline
      .limiter
      .check("smoke", EndpointClass::List)
      .await
      .unwrap();
    assert!(decision.is_allowed());

    pipeline.cache.invalidate_all().await.unwrap();
  }
}
