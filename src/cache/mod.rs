//! Generic caching layer for data persistence and offline support.
//!
//! This module provides a domain-agnostic caching mechanism that:
//! - Stores entries in named buckets with an optional per-entry TTL
//! - Treats expired entries as absent and evicts them lazily on read
//! - Serves cached data when the network is unavailable
//! - Queues mutations made while offline and replays them in order

mod layer;
mod storage;
mod traits;

pub use layer::{CacheLayer, MutationOutcome, ReplaySummary};
pub use storage::{CacheStore, NoopStore, QueuedAction, SqliteStore, Stored};
pub use traits::{Bucket, CacheEntity, CacheResult, CacheSource};
