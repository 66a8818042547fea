//! Resilient retrieval-and-cache core for the Mangaku scraping API.
//!
//! The upstream site is slow, flaky, and answers from inconsistent mirrors;
//! this crate keeps the API responsive anyway. It owns the pieces with real
//! failure-handling depth:
//!
//! - [`fetch::Fetcher`] — pooled outbound HTTP with progressive timeouts
//!   and a bounded retry budget
//! - [`cache::CacheStore`] — TTL-aware caching with single-flight
//!   protection against cache stampedes
//! - [`limit::RateLimiter`] — fixed-window per-client counters over shared
//!   storage
//! - [`retrieve::Orchestrator`] — composes the above with an external parse
//!   step into one keyed retrieval operation
//! - [`health::HealthReporter`] — backend liveness for the status endpoint
//!
//! The HTTP routes, response schemas, and the HTML extraction grammar live
//! outside this crate and plug in through [`pipeline::Pipeline`].

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod health;
pub mod key;
pub mod limit;
pub mod pipeline;
pub mod retrieve;

pub use config::Config;
pub use error::{FetchError, ParseError, RetrievalError, StoreError};
pub use key::{EndpointClass, ResourceKey, TtlClass};
pub use pipeline::Pipeline;
