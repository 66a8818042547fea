//! Process configuration: upstream endpoint, retry policy, TTLs, and
//! rate limits. Loaded once at startup and immutable afterwards.

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::TtlSchedule;
use crate::fetch::RetryPolicy;
use crate::limit::RateLimits;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub upstream: UpstreamConfig,
  pub retry: RetryConfig,
  pub cache: CacheConfig,
  pub rate: RateConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
  /// Base URL of the scraped site.
  pub base_url: String,
  /// The upstream rejects default library agents, so a browser-like agent
  /// is the out-of-the-box value.
  pub user_agent: String,
  /// Idle connections kept per host in the shared pool.
  pub pool_max_idle_per_host: usize,
}

impl Default for UpstreamConfig {
  fn default() -> Self {
    Self {
      base_url: "https://mangaaku.com".to_string(),
      user_agent: "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0"
        .to_string(),
      pool_max_idle_per_host: 20,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub connect_timeout_secs: u64,
  pub read_timeout_secs: u64,
  pub escalated_connect_timeout_secs: u64,
  pub escalated_read_timeout_secs: u64,
  pub max_attempts: u32,
  pub backoff_base_ms: u64,
  pub backoff_cap_ms: u64,
  /// HTTP statuses retried like transport errors; empty by default.
  pub retryable_statuses: Vec<u16>,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      connect_timeout_secs: 30,
      read_timeout_secs: 120,
      escalated_connect_timeout_secs: 60,
      escalated_read_timeout_secs: 180,
      max_attempts: 5,
      backoff_base_ms: 500,
      backoff_cap_ms: 8000,
      retryable_statuses: Vec::new(),
    }
  }
}

impl RetryConfig {
  pub fn policy(&self) -> RetryPolicy {
    RetryPolicy {
      connect_timeout: Duration::from_secs(self.connect_timeout_secs),
      read_timeout: Duration::from_secs(self.read_timeout_secs),
      escalated_connect_timeout: Duration::from_secs(self.escalated_connect_timeout_secs),
      escalated_read_timeout: Duration::from_secs(self.escalated_read_timeout_secs),
      max_attempts: self.max_attempts,
      backoff_base: Duration::from_millis(self.backoff_base_ms),
      backoff_cap: Duration::from_millis(self.backoff_cap_ms),
      retryable_statuses: self.retryable_statuses.clone(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Database file shared by all worker processes.
  /// `None` uses the per-user data directory.
  pub database: Option<PathBuf>,
  pub ttl_list_secs: i64,
  pub ttl_detail_secs: i64,
  pub ttl_chapter_images_secs: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      database: None,
      ttl_list_secs: 300,
      ttl_detail_secs: 600,
      ttl_chapter_images_secs: 3600,
    }
  }
}

impl CacheConfig {
  pub fn ttls(&self) -> TtlSchedule {
    TtlSchedule {
      list: chrono::Duration::seconds(self.ttl_list_secs),
      detail: chrono::Duration::seconds(self.ttl_detail_secs),
      chapter_images: chrono::Duration::seconds(self.ttl_chapter_images_secs),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateConfig {
  pub window_secs: i64,
  pub list_limit: u32,
  pub detail_limit: u32,
  pub chapter_limit: u32,
}

impl Default for RateConfig {
  fn default() -> Self {
    Self {
      window_secs: 60,
      list_limit: 50,
      detail_limit: 30,
      chapter_limit: 20,
    }
  }
}

impl RateConfig {
  pub fn limits(&self) -> RateLimits {
    RateLimits {
      window: chrono::Duration::seconds(self.window_secs),
      list: self.list_limit,
      detail: self.detail_limit,
      chapter: self.chapter_limit,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mangaku.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mangaku/config.yaml
  ///
  /// With no file anywhere, the production defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("mangaku.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("mangaku").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Development profile: short list TTL so edits show up quickly, roomier
  /// read timeout, doubled limits.
  pub fn development() -> Self {
    let mut config = Self::default();
    config.cache.ttl_list_secs = 60;
    config.retry.read_timeout_secs = 180;
    config.rate.list_limit *= 2;
    config.rate.detail_limit *= 2;
    config.rate.chapter_limit *= 2;
    config
  }

  /// Testing profile: small retry budget and short timeouts so failure
  /// paths run fast.
  pub fn testing() -> Self {
    let mut config = Self::default();
    config.retry.max_attempts = 2;
    config.retry.read_timeout_secs = 60;
    config.retry.backoff_base_ms = 1;
    config.retry.backoff_cap_ms = 2;
    config
  }
}
