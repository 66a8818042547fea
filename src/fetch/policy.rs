//! Progressive timeout and retry schedule.
//!
//! The schedule is data, not control flow: each attempt is described by a
//! [`FetchAttempt`] derived from the policy, so the escalation steps can be
//! tested without a network in sight.

use std::time::Duration;

use crate::error::FetchError;

/// Immutable retry configuration, consumed per fetch.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Connect/read bounds for the first attempt.
  pub connect_timeout: Duration,
  pub read_timeout: Duration,
  /// Escalated bounds applied from the second attempt onward. The upstream
  /// tends to recover slowly, so later attempts get more room, not less.
  pub escalated_connect_timeout: Duration,
  pub escalated_read_timeout: Duration,
  /// Total attempt budget, including the first.
  pub max_attempts: u32,
  /// Backoff between attempts: `backoff_base * 2^(n-1)`, capped.
  pub backoff_base: Duration,
  pub backoff_cap: Duration,
  /// HTTP statuses that are retried like transport errors. Empty by default:
  /// a deterministic upstream rejection does not earn another attempt.
  pub retryable_statuses: Vec<u16>,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      connect_timeout: Duration::from_secs(30),
      read_timeout: Duration::from_secs(120),
      escalated_connect_timeout: Duration::from_secs(60),
      escalated_read_timeout: Duration::from_secs(180),
      max_attempts: 5,
      backoff_base: Duration::from_millis(500),
      backoff_cap: Duration::from_secs(8),
      retryable_statuses: Vec::new(),
    }
  }
}

impl RetryPolicy {
  /// Describe attempt `number` (1-based).
  pub fn attempt(&self, number: u32) -> FetchAttempt {
    if number <= 1 {
      FetchAttempt {
        number,
        connect_timeout: self.connect_timeout,
        read_timeout: self.read_timeout,
      }
    } else {
      FetchAttempt {
        number,
        connect_timeout: self.escalated_connect_timeout,
        read_timeout: self.escalated_read_timeout,
      }
    }
  }

  /// Delay to sleep after attempt `completed` fails (1-based).
  pub fn backoff(&self, completed: u32) -> Duration {
    let exponent = completed.saturating_sub(1).min(16);
    let delay = self
      .backoff_base
      .saturating_mul(2u32.saturating_pow(exponent));
    delay.min(self.backoff_cap)
  }

  /// Whether `err` is worth another attempt under this policy.
  pub fn should_retry(&self, err: &FetchError) -> bool {
    match err {
      FetchError::Http { status } => self.retryable_statuses.contains(status),
      other => other.is_transient(),
    }
  }
}

/// One planned HTTP round trip. Ephemeral; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchAttempt {
  /// 1-based attempt number.
  pub number: u32,
  pub connect_timeout: Duration,
  pub read_timeout: Duration,
}

impl FetchAttempt {
  /// Wall-clock bound for the whole round trip.
  pub fn deadline(&self) -> Duration {
    self.connect_timeout + self.read_timeout
  }
}
