//! Fixed-window request limiting per (client, endpoint class).
//!
//! Windows are aligned to the epoch so every process sharing the counter
//! store agrees on window boundaries. The backend's increment-and-read is
//! one atomic operation, so concurrent requests from the same client can
//! never push the observed count past the limit unnoticed.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::cache::CounterBackend;
use crate::error::StoreError;
use crate::key::{EndpointClass, KEY_NAMESPACE};

/// Per-class request limits within one window.
#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
  pub window: Duration,
  pub list: u32,
  pub detail: u32,
  pub chapter: u32,
}

impl Default for RateLimits {
  fn default() -> Self {
    Self {
      window: Duration::seconds(60),
      list: 50,
      detail: 30,
      chapter: 20,
    }
  }
}

impl RateLimits {
  /// Limit for a class; `None` means the class is exempt.
  fn limit(&self, class: EndpointClass) -> Option<u32> {
    match class {
      EndpointClass::List => Some(self.list),
      EndpointClass::Detail => Some(self.detail),
      EndpointClass::Chapter => Some(self.chapter),
      EndpointClass::Health => None,
    }
  }
}

/// Outcome of a rate check. `Denied` is normal control flow under load,
/// never an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
  Allowed {
    /// Requests left in the current window; `None` for exempt classes.
    remaining: Option<u32>,
  },
  Denied {
    /// Time until the window resets; the route layer surfaces this as a
    /// Retry-After hint.
    retry_after: Duration,
  },
}

impl Decision {
  pub fn is_allowed(&self) -> bool {
    matches!(self, Decision::Allowed { .. })
  }
}

/// Fixed-window rate limiter over shared counter storage.
pub struct RateLimiter {
  backend: Arc<dyn CounterBackend>,
  limits: RateLimits,
}

impl RateLimiter {
  pub fn new(backend: Arc<dyn CounterBackend>, limits: RateLimits) -> Self {
    Self { backend, limits }
  }

  /// Count one request from `client` against `class` and decide.
  pub async fn check(
    &self,
    client: &str,
    class: EndpointClass,
  ) -> Result<Decision, StoreError> {
    // Exemption is decided by class tag before any backend round trip.
    if class.is_exempt() {
      return Ok(Decision::Allowed { remaining: None });
    }
    let Some(limit) = self.limits.limit(class) else {
      return Ok(Decision::Allowed { remaining: None });
    };

    let now = Utc::now();
    let window_start = align_window(now, self.limits.window);
    let key = window_key(client, class);

    let count = self
      .backend
      .incr_window(&key, window_start, self.limits.window)
      .await?;

    if count <= limit {
      Ok(Decision::Allowed {
        remaining: Some(limit - count),
      })
    } else {
      let retry_after = window_start + self.limits.window - now;
      debug!(
        client,
        class = class.as_str(),
        count,
        limit,
        retry_after_secs = retry_after.num_seconds(),
        "request denied by rate limit"
      );
      Ok(Decision::Denied { retry_after })
    }
  }
}

fn window_key(client: &str, class: EndpointClass) -> String {
  format!("{KEY_NAMESPACE}rate:{client}:{}", class.as_str())
}

/// Start of the fixed window containing `now`, aligned to the epoch.
fn align_window(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
  let secs = window.num_seconds().max(1);
  let start = now.timestamp() - now.timestamp().rem_euclid(secs);
  DateTime::from_timestamp(start, 0).unwrap_or(now)
}
