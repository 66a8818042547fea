//! Resource keys and classification enums.
//!
//! Keys are only built through the typed constructors so every call site
//! composes the same key for the same logical resource.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace prefix applied to every persisted key, so a shared backing
/// store can be inspected (or cleared) without touching other tenants.
pub const KEY_NAMESPACE: &str = "mangaku_api:";

/// Deterministic identifier for one cacheable unit of content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceKey(String);

impl ResourceKey {
  /// Key for one page of the manga list.
  pub fn list(page: u32) -> Self {
    Self(format!("list:page={page}"))
  }

  /// Key for a manga detail record.
  pub fn detail(slug: &str) -> Self {
    Self(format!("detail:{}", slug.trim_matches('/')))
  }

  /// Key for a chapter's image set.
  pub fn chapter(slug: &str) -> Self {
    Self(format!("chapter:{}", slug.trim_matches('/')))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Namespaced form used in the backing store.
  pub fn storage_key(&self) -> String {
    format!("{KEY_NAMESPACE}{}", self.0)
  }
}

impl fmt::Display for ResourceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Volatility class of the underlying content; maps to a configured TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtlClass {
  /// List pages change whenever any manga updates.
  List,
  /// Detail records change when chapters are added.
  Detail,
  /// Image sets rarely change once published.
  ChapterImages,
}

/// Endpoint class a request counts against in the rate limiter.
///
/// Exemption is decided by this tag, never by path matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointClass {
  List,
  Detail,
  Chapter,
  Health,
}

impl EndpointClass {
  /// Health probes bypass the limiter entirely.
  pub fn is_exempt(self) -> bool {
    matches!(self, EndpointClass::Health)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      EndpointClass::List => "list",
      EndpointClass::Detail => "detail",
      EndpointClass::Chapter => "chapter",
      EndpointClass::Health => "health",
    }
  }
}
