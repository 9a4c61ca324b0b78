//! Core traits and types for the caching system.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Named partition of the durable store, analogous to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
  Students,
  Feedback,
  Profile,
  /// Generic request cache keyed by request descriptor hash
  Cache,
}

impl Bucket {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Students => "students",
      Self::Feedback => "feedback",
      Self::Profile => "profile",
      Self::Cache => "cache",
    }
  }

  pub const ALL: [Bucket; 4] = [Self::Students, Self::Feedback, Self::Profile, Self::Cache];

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "students" => Some(Self::Students),
      "feedback" => Some(Self::Feedback),
      "profile" => Some(Self::Profile),
      "cache" => Some(Self::Cache),
      _ => None,
    }
  }
}

impl std::fmt::Display for Bucket {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Trait for entities that live in a fixed bucket with a fixed TTL.
///
/// Implementors get the domain convenience methods on the cached client;
/// everything else goes through the generic bucket/key primitives.
pub trait CacheEntity: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Unique identifier for this entity (e.g., student id)
  fn cache_key(&self) -> String;

  /// Bucket this entity type is stored in
  fn bucket() -> Bucket;

  /// How long a cached copy stays valid
  fn ttl() -> Duration;
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Valid cached data served without a network attempt.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Cached data served because the network was unavailable or failed.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  pub fn is_from_cache(&self) -> bool {
    self.source != CacheSource::Network
  }

  pub fn is_offline(&self) -> bool {
    self.source == CacheSource::Offline
  }
}

/// Indicates where data handed to the caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Unexpired cached data, network not attempted
  Cache,
  /// Network unavailable or failed, serving cached data
  Offline,
}
