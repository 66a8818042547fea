//! Error taxonomy for the retrieval pipeline.
//!
//! Fetch and retrieval errors are `Clone` because a single outcome is fanned
//! out to every caller waiting on the same in-flight computation.

use thiserror::Error;

/// Failure of an upstream fetch, classified by transport layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
  /// The attempt exceeded its connect + read deadline.
  #[error("attempt {attempt} timed out")]
  Timeout { attempt: u32 },

  /// Connection-level failure (refused, reset, DNS, TLS).
  #[error("transport error: {0}")]
  Transport(String),

  /// The upstream answered with a non-success status. Not retried unless the
  /// status is listed in the policy's retryable set.
  #[error("upstream returned HTTP {status}")]
  Http { status: u16 },

  /// The retry budget ran out. Carries the outcome of the final attempt.
  #[error("gave up after {attempts} attempts: {last}")]
  Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
  /// Whether this error class can ever be worth another attempt.
  /// HTTP statuses are only retryable when the policy says so.
  pub fn is_transient(&self) -> bool {
    matches!(self, FetchError::Timeout { .. } | FetchError::Transport(_))
  }
}

/// The upstream was reachable but its content did not match the expected
/// structure. Produced by the external parse step, never by this crate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unexpected content structure: {0}")]
pub struct ParseError(pub String);

/// Fault in the cache or counter backing store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
  #[error("backing store error: {0}")]
  Backend(String),

  #[error("codec error: {0}")]
  Codec(String),
}

impl From<rusqlite::Error> for StoreError {
  fn from(e: rusqlite::Error) -> Self {
    StoreError::Backend(e.to_string())
  }
}

impl From<serde_json::Error> for StoreError {
  fn from(e: serde_json::Error) -> Self {
    StoreError::Codec(e.to_string())
  }
}

/// Terminal outcome of a retrieval, carrying which stage failed so the route
/// layer can distinguish "upstream unreachable" from "format changed".
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
  #[error("upstream fetch failed: {0}")]
  Upstream(#[from] FetchError),

  #[error("parse failed: {0}")]
  Parse(#[from] ParseError),

  #[error("store failed: {0}")]
  Store(#[from] StoreError),
}
