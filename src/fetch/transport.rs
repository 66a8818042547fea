//! Transport seam between the retry loop and the wire.
//!
//! The real implementation is a pooled reqwest client; tests substitute a
//! scripted transport to drive the retry state machine deterministically.

use async_trait::async_trait;
use url::Url;

use crate::error::FetchError;
use crate::fetch::policy::FetchAttempt;

/// Raw response body, handed to the external parser untouched.
pub type RawPayload = Vec<u8>;

/// One HTTP round trip under the bounds of a single attempt.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn execute(&self, url: &Url, attempt: &FetchAttempt) -> Result<RawPayload, FetchError>;
}

/// Pooled reqwest transport shared across all resource keys.
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  /// Build the shared client.
  ///
  /// The connect timeout is client-wide in reqwest, so it is set to the
  /// escalated bound; the per-attempt deadline (connect + read) is what
  /// actually enforces each attempt's budget.
  pub fn new(
    user_agent: &str,
    pool_max_idle_per_host: usize,
    connect_timeout: std::time::Duration,
  ) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .user_agent(user_agent)
      .pool_max_idle_per_host(pool_max_idle_per_host)
      .connect_timeout(connect_timeout)
      .build()
      .map_err(|e| FetchError::Transport(format!("failed to build http client: {e}")))?;

    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn execute(&self, url: &Url, attempt: &FetchAttempt) -> Result<RawPayload, FetchError> {
    let response = self
      .client
      .get(url.clone())
      .timeout(attempt.deadline())
      .send()
      .await
      .map_err(|e| classify(e, attempt))?;

    let status = response.status();
    if !status.is_success() {
      return Err(FetchError::Http {
        status: status.as_u16(),
      });
    }

    let body = response
      .bytes()
      .await
      .map_err(|e| classify(e, attempt))?;

    Ok(body.to_vec())
  }
}

fn classify(e: reqwest::Error, attempt: &FetchAttempt) -> FetchError {
  if e.is_timeout() {
    FetchError::Timeout {
      attempt: attempt.number,
    }
  } else {
    FetchError::Transport(e.to_string())
  }
}
