//! Cache layer that orchestrates caching logic with network fetching.
//!
//! This layer sits between the application and the network client and
//! decides, per request, whether to serve from cache, call the network, or
//! queue a mutation for later replay.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::connectivity::ConnectivityProbe;

use super::storage::{CacheStore, QueuedAction, Stored};
use super::traits::{Bucket, CacheEntity, CacheResult};

/// Outcome of a mutating call.
#[derive(Debug)]
pub enum MutationOutcome<T> {
  /// The mutation reached the server.
  Completed(T),
  /// The network was unavailable; the mutation is queued for replay.
  /// Carries the failure so the caller can report a degraded state
  /// instead of an error.
  Queued { error: ApiError },
}

impl<T> MutationOutcome<T> {
  pub fn is_queued(&self) -> bool {
    matches!(self, Self::Queued { .. })
  }
}

/// What happened during a replay pass over the offline queue.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
  /// Actions replayed and removed from the queue
  pub replayed: usize,
  /// Actions that failed again and stay queued
  pub remaining: usize,
}

/// Offline-first cache layer over a storage backend and a connectivity probe.
pub struct CacheLayer<S: CacheStore> {
  store: Arc<S>,
  probe: Arc<dyn ConnectivityProbe>,
  /// Serve valid cached entries without touching the network
  cache_first: bool,
}

impl<S: CacheStore> CacheLayer<S> {
  pub fn new(store: S, probe: Arc<dyn ConnectivityProbe>) -> Self {
    Self {
      store: Arc::new(store),
      probe,
      cache_first: false,
    }
  }

  /// Enable cache-first reads: a valid (unexpired) entry short-circuits
  /// the network.
  pub fn with_cache_first(mut self, cache_first: bool) -> Self {
    self.cache_first = cache_first;
    self
  }

  pub fn store(&self) -> &S {
    &self.store
  }

  /// Fetch with offline fallback.
  ///
  /// Offline: serve the cached value or fail without touching the network.
  /// Online: optionally serve a valid cached entry (cache-first), otherwise
  /// fetch, overwrite the cache, and return fresh data; on fetch failure
  /// fall back to the cached value when one exists.
  pub async fn fetch<T, F, Fut>(
    &self,
    bucket: Bucket,
    key: &str,
    ttl: Duration,
    fetcher: F,
  ) -> ApiResult<CacheResult<T>>
  where
    T: Clone + Send + Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
  {
    if !self.probe.is_online() {
      return match self.read_cache::<T>(bucket, key) {
        Some(cached) => Ok(CacheResult::offline(cached.data, cached.cached_at)),
        None => Err(ApiError::transport(
          "You appear to be offline and no cached data is available",
        )),
      };
    }

    if self.cache_first {
      if let Some(cached) = self.read_cache::<T>(bucket, key) {
        debug!(bucket = %bucket, key, "serving cached data");
        return Ok(CacheResult::from_cache(cached.data, cached.cached_at));
      }
    }

    match fetcher().await {
      Ok(data) => {
        self.write_cache(bucket, key, &data, ttl);
        Ok(CacheResult::from_network(data))
      }
      Err(err) => {
        // Network failed, fall back to cache if we have anything
        match self.read_cache::<T>(bucket, key) {
          Some(cached) => {
            warn!(bucket = %bucket, key, error = %err, "network failed, serving cached data");
            Ok(CacheResult::offline(cached.data, cached.cached_at))
          }
          None => Err(err),
        }
      }
    }
  }

  /// Run a mutation, queueing it for replay when the network is unreachable.
  ///
  /// Mutations are never served from cache. When the probe already reports
  /// offline the action is queued without touching the network; a
  /// transport-level failure (no HTTP status) while online queues it too.
  /// Any other failure propagates.
  pub async fn mutate<A, T, F, Fut>(&self, action: &A, send: F) -> ApiResult<MutationOutcome<T>>
  where
    A: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ApiResult<T>>,
  {
    if !self.probe.is_online() {
      let err = ApiError::transport("You appear to be offline");
      return self.queue_action(action, err);
    }

    match send().await {
      Ok(data) => Ok(MutationOutcome::Completed(data)),
      Err(err) if matches!(&err, ApiError::Network { status: None, .. }) => {
        self.queue_action(action, err)
      }
      Err(err) => Err(err),
    }
  }

  fn queue_action<A: Serialize, T>(
    &self,
    action: &A,
    err: ApiError,
  ) -> ApiResult<MutationOutcome<T>> {
    match self.store.enqueue(action) {
      Ok(id) => {
        debug!(queue_id = id, "mutation queued for replay");
        Ok(MutationOutcome::Queued { error: err })
      }
      // Can't queue either; the original failure is the useful one
      Err(store_err) => {
        warn!(error = %store_err, "failed to queue offline mutation");
        Err(err)
      }
    }
  }

  /// Replay queued mutations sequentially, in enqueue order.
  ///
  /// Each action is awaited to completion before the next starts, so a
  /// reconnect does not amplify load. Successful actions are removed;
  /// failed ones stay queued for the next replay pass (at-least-once).
  pub async fn replay<A, F, Fut>(&self, handler: F) -> ReplaySummary
  where
    A: DeserializeOwned,
    F: Fn(A) -> Fut,
    Fut: Future<Output = ApiResult<()>>,
  {
    let queued: Vec<QueuedAction<A>> = match self.store.queued_actions() {
      Ok(queued) => queued,
      Err(err) => {
        warn!(error = %err, "failed to read offline queue");
        return ReplaySummary::default();
      }
    };

    let mut summary = ReplaySummary::default();
    for item in queued {
      match handler(item.action).await {
        Ok(()) => {
          if let Err(err) = self.store.remove_action(item.id) {
            warn!(queue_id = item.id, error = %err, "failed to remove replayed action");
          }
          summary.replayed += 1;
        }
        Err(err) => {
          debug!(queue_id = item.id, error = %err, "replay failed, action stays queued");
          summary.remaining += 1;
        }
      }
    }

    summary
  }

  /// Write-through a single entity under its own key, so by-id lookups
  /// can be served offline after a collection fetch.
  pub fn put_entity<E: CacheEntity>(&self, entity: &E) {
    self.write_cache(E::bucket(), &entity.cache_key(), entity, E::ttl());
  }

  pub fn clear(&self, bucket: Bucket) {
    if let Err(err) = self.store.clear(bucket) {
      warn!(bucket = %bucket, error = %err, "failed to clear bucket");
    }
  }

  /// Store failures read as a miss; the caller contract stays Option-like.
  fn read_cache<T: DeserializeOwned>(&self, bucket: Bucket, key: &str) -> Option<Stored<T>> {
    match self.store.get(bucket, key) {
      Ok(entry) => entry,
      Err(err) => {
        warn!(bucket = %bucket, key, error = %err, "cache read failed");
        None
      }
    }
  }

  fn write_cache<T: Serialize>(&self, bucket: Bucket, key: &str, data: &T, ttl: Duration) {
    if let Err(err) = self.store.put(bucket, key, data, Some(ttl)) {
      warn!(bucket = %bucket, key, error = %err, "cache write failed");
    }
  }
}

impl<S: CacheStore> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      probe: Arc::clone(&self.probe),
      cache_first: self.cache_first,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::SqliteStore;
  use crate::connectivity::ManualProbe;
  use std::sync::atomic::{AtomicU32, Ordering};

  const TTL: Duration = Duration::from_secs(60);

  fn layer(online: bool) -> (CacheLayer<SqliteStore>, ManualProbe) {
    let probe = ManualProbe::new(online);
    let layer = CacheLayer::new(
      SqliteStore::open_in_memory().unwrap(),
      Arc::new(probe.clone()),
    );
    (layer, probe)
  }

  fn server_error() -> ApiError {
    ApiError::from_status(503, None, None, None)
  }

  fn queued_count(layer: &CacheLayer<SqliteStore>) -> usize {
    layer.store().queued_actions::<String>().unwrap().len()
  }

  #[tokio::test]
  async fn test_fetch_stores_and_returns_fresh_data() {
    let (layer, _) = layer(true);

    let result = layer
      .fetch(Bucket::Students, "all", TTL, || async {
        Ok(vec!["ada".to_string()])
      })
      .await
      .unwrap();

    assert_eq!(result.data, vec!["ada".to_string()]);
    assert!(!result.is_from_cache());

    let stored: Vec<Vec<String>> = layer.store().get_all(Bucket::Students).unwrap();
    assert_eq!(stored.len(), 1);
  }

  #[tokio::test]
  async fn test_network_failure_falls_back_to_cache() {
    let (layer, _) = layer(true);

    layer
      .store()
      .put(Bucket::Students, "all", &vec!["cached".to_string()], Some(TTL))
      .unwrap();

    let result = layer
      .fetch(Bucket::Students, "all", TTL, || async {
        Err::<Vec<String>, _>(server_error())
      })
      .await
      .unwrap();

    assert_eq!(result.data, vec!["cached".to_string()]);
    assert!(result.is_from_cache());
    assert!(result.is_offline());
  }

  #[tokio::test]
  async fn test_network_failure_without_cache_propagates() {
    let (layer, _) = layer(true);

    let result = layer
      .fetch(Bucket::Students, "all", TTL, || async {
        Err::<Vec<String>, _>(server_error())
      })
      .await;

    assert!(matches!(result, Err(ApiError::Network { status: Some(503), .. })));
  }

  #[tokio::test]
  async fn test_offline_serves_cache_without_network_attempt() {
    let (layer, _) = layer(false);
    let attempts = AtomicU32::new(0);

    layer
      .store()
      .put(Bucket::Profile, "me", &"cached".to_string(), Some(TTL))
      .unwrap();

    let result = layer
      .fetch(Bucket::Profile, "me", TTL, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Ok("fresh".to_string()) }
      })
      .await
      .unwrap();

    assert_eq!(result.data, "cached");
    assert!(result.is_offline());
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_offline_without_cache_is_an_error() {
    let (layer, _) = layer(false);

    let result = layer
      .fetch(Bucket::Profile, "me", TTL, || async { Ok("fresh".to_string()) })
      .await;

    assert!(matches!(result, Err(ApiError::Network { status: None, .. })));
  }

  #[tokio::test]
  async fn test_cache_first_skips_network_for_valid_entry() {
    let (layer, _) = layer(true);
    let layer = layer.with_cache_first(true);
    let attempts = AtomicU32::new(0);

    layer
      .store()
      .put(Bucket::Students, "all", &"cached".to_string(), Some(TTL))
      .unwrap();

    let result = layer
      .fetch(Bucket::Students, "all", TTL, || {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Ok("fresh".to_string()) }
      })
      .await
      .unwrap();

    assert_eq!(result.data, "cached");
    assert!(result.is_from_cache());
    assert!(!result.is_offline());
    assert_eq!(attempts.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_cache_first_fetches_when_entry_expired() {
    let (layer, _) = layer(true);
    let layer = layer.with_cache_first(true);

    layer
      .store()
      .put(
        Bucket::Students,
        "all",
        &"stale".to_string(),
        Some(Duration::from_millis(0)),
      )
      .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    let result = layer
      .fetch(Bucket::Students, "all", TTL, || async { Ok("fresh".to_string()) })
      .await
      .unwrap();

    assert_eq!(result.data, "fresh");
    assert!(!result.is_from_cache());
  }

  #[tokio::test]
  async fn test_refetch_overwrites_single_entry() {
    let (layer, _) = layer(true);

    for value in ["first", "second"] {
      layer
        .fetch(Bucket::Students, "all", TTL, || async {
          Ok(value.to_string())
        })
        .await
        .unwrap();
    }

    let stored: Vec<String> = layer.store().get_all(Bucket::Students).unwrap();
    assert_eq!(stored, vec!["second".to_string()]);
  }

  #[tokio::test]
  async fn test_mutation_success_passes_through() {
    let (layer, _) = layer(true);

    let outcome = layer
      .mutate(&"action".to_string(), || async { Ok("created".to_string()) })
      .await
      .unwrap();

    assert!(matches!(outcome, MutationOutcome::Completed(ref v) if v == "created"));
    assert_eq!(queued_count(&layer), 0);
  }

  #[tokio::test]
  async fn test_mutation_queued_when_transport_fails() {
    let (layer, _) = layer(true);

    let outcome = layer
      .mutate(&"action".to_string(), || async {
        Err::<(), _>(ApiError::transport("connection refused"))
      })
      .await
      .unwrap();

    assert!(outcome.is_queued());
    assert_eq!(queued_count(&layer), 1);
  }

  #[tokio::test]
  async fn test_mutation_while_offline_queues_without_sending() {
    let (layer, _) = layer(false);
    let sends = AtomicU32::new(0);

    let outcome = layer
      .mutate(&"action".to_string(), || {
        sends.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(ApiError::transport("connection refused")) }
      })
      .await
      .unwrap();

    assert_eq!(sends.load(Ordering::SeqCst), 0);
    assert!(outcome.is_queued());
    assert_eq!(queued_count(&layer), 1);
  }

  #[tokio::test]
  async fn test_mutation_server_rejection_propagates() {
    let (layer, _) = layer(true);

    let result = layer
      .mutate(&"action".to_string(), || async {
        Err::<(), _>(ApiError::from_status(422, None, None, None))
      })
      .await;

    assert!(matches!(result, Err(ApiError::Validation { .. })));
    assert_eq!(queued_count(&layer), 0);
  }

  #[tokio::test]
  async fn test_replay_invokes_handler_once_per_action_and_drains_queue() {
    let (layer, probe) = layer(false);

    for action in ["a", "b"] {
      let outcome = layer
        .mutate(&action.to_string(), || async {
          Err::<(), _>(ApiError::transport("offline"))
        })
        .await
        .unwrap();
      assert!(outcome.is_queued());
    }
    assert_eq!(queued_count(&layer), 2);

    probe.set_online(true);
    let calls = AtomicU32::new(0);
    let summary = layer
      .replay(|_: String| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
      })
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(summary, ReplaySummary { replayed: 2, remaining: 0 });
    assert_eq!(queued_count(&layer), 0);
  }

  #[tokio::test]
  async fn test_replay_keeps_failed_actions_queued() {
    let (layer, _) = layer(true);

    layer.store().enqueue(&"a".to_string()).unwrap();
    layer.store().enqueue(&"b".to_string()).unwrap();

    // First action fails, second succeeds
    let summary = layer
      .replay(|action: String| async move {
        if action == "a" {
          Err(server_error())
        } else {
          Ok(())
        }
      })
      .await;

    assert_eq!(summary, ReplaySummary { replayed: 1, remaining: 1 });

    let queued: Vec<QueuedAction<String>> = layer.store().queued_actions().unwrap();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].action, "a");
  }
}
