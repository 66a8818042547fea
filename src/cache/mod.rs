//! Caching layer: TTL-aware store, pluggable backends, and the
//! single-flight guard against cache stampedes.
//!
//! The store enforces logical expiry on read even when a backend also
//! expires rows natively; backends exist for SQLite (shared across worker
//! processes) and a plain map (tests, testing profile).

mod backend;
mod flight;
mod memory;
mod sqlite;
mod store;

pub use backend::{CacheEntry, CounterBackend, StoreBackend};
pub use flight::FlightGroup;
pub use memory::MemoryBackend;
pub use sqlite::SqliteBackend;
pub use store::{CacheStore, TtlSchedule};
