//! Caching implementations for platform types.

use std::time::Duration;

use sha2::{Digest, Sha256};

use crate::cache::{Bucket, CacheEntity};

use super::types::{Feedback, Profile, Student};

pub(crate) const COLLECTION_TTL: Duration = Duration::from_secs(60 * 60);
pub(crate) const PROFILE_TTL: Duration = Duration::from_secs(120 * 60);

// ============================================================================
// CacheEntity implementations
// ============================================================================

impl CacheEntity for Student {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn bucket() -> Bucket {
    Bucket::Students
  }

  fn ttl() -> Duration {
    COLLECTION_TTL
  }
}

impl CacheEntity for Feedback {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn bucket() -> Bucket {
    Bucket::Feedback
  }

  fn ttl() -> Duration {
    COLLECTION_TTL
  }
}

impl CacheEntity for Profile {
  fn cache_key(&self) -> String {
    self.id.clone()
  }

  fn bucket() -> Bucket {
    Bucket::Profile
  }

  fn ttl() -> Duration {
    PROFILE_TTL
  }
}

// ============================================================================
// Request descriptors
// ============================================================================

/// Typed descriptor of a GET request, used as a cache key.
///
/// Replaces ad-hoc `"GET:/students"` strings: the method, path, and query
/// parameters are hashed together, so requests that differ only in
/// parameters cannot collide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
  pub method: &'static str,
  pub path: String,
  pub params: Vec<(String, String)>,
}

impl RequestKey {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: "GET",
      path: path.into(),
      params: Vec::new(),
    }
  }

  pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.params.push((name.into(), value.into()));
    self
  }

  /// Stable, fixed-length cache key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b"\n");
    hasher.update(self.path.as_bytes());
    for (name, value) in &self.params {
      hasher.update(b"\n");
      hasher.update(name.as_bytes());
      hasher.update(b"=");
      hasher.update(value.as_bytes());
    }
    hex::encode(hasher.finalize())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_same_request_hashes_identically() {
    let a = RequestKey::get("/students").with_param("status", "placed");
    let b = RequestKey::get("/students").with_param("status", "placed");
    assert_eq!(a.cache_hash(), b.cache_hash());
  }

  #[test]
  fn test_params_change_the_hash() {
    let plain = RequestKey::get("/students");
    let filtered = RequestKey::get("/students").with_param("status", "placed");
    assert_ne!(plain.cache_hash(), filtered.cache_hash());
  }

  #[test]
  fn test_structured_fields_avoid_separator_collisions() {
    // "a=b" as a name must not collide with name "a", value "b"
    let joined = RequestKey::get("/x").with_param("a=b", "");
    let split = RequestKey::get("/x").with_param("a", "b");
    assert_ne!(joined.cache_hash(), split.cache_hash());
  }
}
