//! Liveness reporting for the cache and rate-limiter backing stores.
//!
//! Probes are cheap backend pings with their own short timeout; a status
//! check never goes anywhere near the fetcher or the upstream.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::cache::{CounterBackend, StoreBackend};
use crate::error::StoreError;

/// Bound on each probe, independent of the fetcher's retry policy.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
  Healthy,
  Degraded,
}

/// Aggregate status for the external report-status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
  pub cache: Liveness,
  pub rate_limiter: Liveness,
  pub timestamp: DateTime<Utc>,
}

impl HealthStatus {
  pub fn is_healthy(&self) -> bool {
    self.cache == Liveness::Healthy && self.rate_limiter == Liveness::Healthy
  }
}

pub struct HealthReporter {
  cache: Arc<dyn StoreBackend>,
  counters: Arc<dyn CounterBackend>,
}

impl HealthReporter {
  pub fn new(cache: Arc<dyn StoreBackend>, counters: Arc<dyn CounterBackend>) -> Self {
    Self { cache, counters }
  }

  pub async fn status(&self) -> HealthStatus {
    // Both probes run concurrently; a hung backend costs one probe timeout,
    // not two.
    let (cache, rate_limiter) = futures::join!(
      probe("cache", self.cache.ping()),
      probe("rate_limiter", self.counters.ping())
    );
    HealthStatus {
      cache,
      rate_limiter,
      timestamp: Utc::now(),
    }
  }
}

async fn probe<F>(name: &str, ping: F) -> Liveness
where
  F: Future<Output = Result<(), StoreError>>,
{
  match tokio::time::timeout(PROBE_TIMEOUT, ping).await {
    Ok(Ok(())) => Liveness::Healthy,
    Ok(Err(e)) => {
      warn!(backend = name, error = %e, "liveness probe failed");
      Liveness::Degraded
    }
    Err(_) => {
      warn!(backend = name, timeout_secs = PROBE_TIMEOUT.as_secs(), "liveness probe timed out");
      Liveness::Degraded
    }
  }
}
