//! Outbound HTTP with progressive timeouts and a bounded retry budget.
//!
//! The fetcher owns no cache and no parser: its only job is to turn a URL
//! into raw bytes or a classified [`FetchError`], retrying transient
//! failures with escalating timeouts and exponential backoff.

mod policy;
mod transport;

pub use policy::{FetchAttempt, RetryPolicy};
pub use transport::{HttpTransport, RawPayload, Transport};

use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;

/// Retrying fetcher over a shared transport.
pub struct Fetcher {
  transport: Arc<dyn Transport>,
  policy: RetryPolicy,
}

impl Fetcher {
  pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
    Self { transport, policy }
  }

  /// Build a fetcher over the real pooled HTTP transport.
  pub fn over_http(
    user_agent: &str,
    pool_max_idle_per_host: usize,
    policy: RetryPolicy,
  ) -> Result<Self, FetchError> {
    let transport = HttpTransport::new(
      user_agent,
      pool_max_idle_per_host,
      policy.escalated_connect_timeout,
    )?;
    Ok(Self::new(Arc::new(transport), policy))
  }

  /// Fetch `url`, retrying transient failures up to the policy's budget.
  ///
  /// Timeouts and transport errors are retried with escalated timeouts and
  /// backoff delay; HTTP error statuses return immediately unless listed in
  /// the policy's retryable set. Exhausting the budget yields
  /// [`FetchError::Exhausted`] carrying the final attempt's outcome.
  pub async fn fetch(&self, url: &Url) -> Result<RawPayload, FetchError> {
    let mut last: Option<FetchError> = None;

    for number in 1..=self.policy.max_attempts {
      if number > 1 {
        let delay = self.policy.backoff(number - 1);
        warn!(
          url = %url,
          attempt = number,
          delay_ms = delay.as_millis() as u64,
          "retrying upstream fetch"
        );
        tokio::time::sleep(delay).await;
      }

      let attempt = self.policy.attempt(number);
      debug!(
        url = %url,
        attempt = number,
        connect_timeout = ?attempt.connect_timeout,
        read_timeout = ?attempt.read_timeout,
        "fetch attempt"
      );

      match self.transport.execute(url, &attempt).await {
        Ok(payload) => {
          debug!(url = %url, attempt = number, bytes = payload.len(), "fetch succeeded");
          return Ok(payload);
        }
        Err(err) if self.policy.should_retry(&err) => {
          debug!(url = %url, attempt = number, error = %err, "attempt failed");
          last = Some(err);
        }
        Err(err) => return Err(err),
      }
    }

    let last = last.unwrap_or_else(|| FetchError::Transport("retry budget is zero".into()));
    Err(FetchError::Exhausted {
      attempts: self.policy.max_attempts,
      last: Box::new(last),
    })
  }
}


#[cfg(test)]
mod tests {
  use super::testing::ScriptedTransport;
  use super::*;
  use std::time::Duration;

  fn fetcher(script: Vec<Result<RawPayload, FetchError>>, policy: RetryPolicy) -> (Fetcher, Arc<ScriptedTransport>) {
    let transport = Arc::new(ScriptedTransport::new(script));
    (Fetcher::new(transport.clone(), policy), transport)
  }

  fn url() -> Url {
    Url::parse("https://mangaaku.com/manga/?page=1").unwrap()
  }

  #[tokio::test(start_paused = true)]
  async fn test_success_on_first_attempt() {
    let (fetcher, transport) = fetcher(vec![Ok(b"html".to_vec())], RetryPolicy::default());

    let payload = fetcher.fetch(&url()).await.unwrap();
    assert_eq!(payload, b"html");
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_timeouts_escalate_then_succeed() {
    // Times out on attempts 1-2, succeeds on attempt 3.
    let (fetcher, transport) = fetcher(
      vec![
        Err(FetchError::Timeout { attempt: 1 }),
        Err(FetchError::Timeout { attempt: 2 }),
        Ok(b"late but fine".to_vec()),
      ],
      RetryPolicy::default(),
    );

    let payload = fetcher.fetch(&url()).await.unwrap();
    assert_eq!(payload, b"late but fine");

    let seen = transport.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    // First attempt runs on base timeouts.
    assert_eq!(seen[0].connect_timeout, Duration::from_secs(30));
    assert_eq!(seen[0].read_timeout, Duration::from_secs(120));
    // The successful third attempt ran with escalated bounds.
    assert_eq!(seen[2].connect_timeout, Duration::from_secs(60));
    assert_eq!(seen[2].read_timeout, Duration::from_secs(180));
  }

  #[tokio::test(start_paused = true)]
  async fn test_backoff_delay_between_attempts() {
    let (fetcher, _) = fetcher(
      vec![
        Err(FetchError::Transport("reset".into())),
        Ok(b"ok".to_vec()),
      ],
      RetryPolicy::default(),
    );

    let start = tokio::time::Instant::now();
    fetcher.fetch(&url()).await.unwrap();
    // One failure, so exactly one backoff sleep of the base delay.
    assert_eq!(start.elapsed(), Duration::from_millis(500));
  }

  #[tokio::test(start_paused = true)]
  async fn test_http_error_returns_immediately() {
    let (fetcher, transport) = fetcher(
      vec![Err(FetchError::Http { status: 404 })],
      RetryPolicy::default(),
    );

    let err = fetcher.fetch(&url()).await.unwrap_err();
    assert_eq!(err, FetchError::Http { status: 404 });
    assert_eq!(transport.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_retryable_status_is_retried() {
    let policy = RetryPolicy {
      retryable_statuses: vec![503],
      ..RetryPolicy::default()
    };
    let (fetcher, transport) = fetcher(
      vec![Err(FetchError::Http { status: 503 }), Ok(b"ok".to_vec())],
      policy,
    );

    fetcher.fetch(&url()).await.unwrap();
    assert_eq!(transport.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_exhausted_carries_last_outcome() {
    let policy = RetryPolicy {
      max_attempts: 3,
      ..RetryPolicy::default()
    };
    let (fetcher, transport) = fetcher(
      vec![
        Err(FetchError::Timeout { attempt: 1 }),
        Err(FetchError::Transport("reset".into())),
        Err(FetchError::Timeout { attempt: 3 }),
      ],
      policy,
    );

    let err = fetcher.fetch(&url()).await.unwrap_err();
    match err {
      FetchError::Exhausted { attempts, last } => {
        assert_eq!(attempts, 3);
        assert_eq!(*last, FetchError::Timeout { attempt: 3 });
      }
      other => panic!("expected Exhausted, got {other:?}"),
    }
    assert_eq!(transport.calls(), 3);
  }
}
