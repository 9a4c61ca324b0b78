//! Cached platform client that wraps ApiClient with offline-first behavior.

use std::sync::Arc;

use color_eyre::Result;
use serde_json::{json, Value};

use crate::cache::{
  Bucket, CacheEntity, CacheLayer, CacheResult, CacheStore, MutationOutcome, NoopStore,
  ReplaySummary, SqliteStore,
};
use crate::config::Config;
use crate::connectivity::ConnectivityProbe;

use super::actions::PendingAction;
use super::cache::{RequestKey, COLLECTION_TTL};
use super::client::ApiClient;
use super::error::ApiResult;
use super::types::{Application, ApplicationStage, Feedback, Profile, Student};

/// Platform client with transparent caching and an offline mutation queue.
///
/// This wraps the underlying ApiClient and provides the same API, but
/// automatically caches GET results and queues mutations made while the
/// network is unreachable.
pub struct CachedClient<S: CacheStore> {
  inner: ApiClient,
  cache: CacheLayer<S>,
}

impl CachedClient<SqliteStore> {
  /// Build a client with the durable store from config.
  pub fn open(config: &Config, probe: Arc<dyn ConnectivityProbe>) -> Result<Self> {
    let inner = ApiClient::new(config)?;
    let store = match &config.cache.path {
      Some(path) => SqliteStore::open(path)?,
      None => SqliteStore::open_default()?,
    };
    let cache = CacheLayer::new(store, probe).with_cache_first(config.cache.cache_first);

    Ok(Self { inner, cache })
  }
}

impl CachedClient<NoopStore> {
  /// Build a client that never caches and never queues.
  pub fn without_cache(config: &Config, probe: Arc<dyn ConnectivityProbe>) -> Result<Self> {
    let inner = ApiClient::new(config)?;
    let cache = CacheLayer::new(NoopStore, probe);

    Ok(Self { inner, cache })
  }
}

impl<S: CacheStore> CachedClient<S> {
  /// List students, offline-capable.
  pub async fn students(&self) -> ApiResult<CacheResult<Vec<Student>>> {
    let key = RequestKey::get("/students");
    let result = self
      .cache
      .fetch(Bucket::Students, &key.cache_hash(), Student::ttl(), || {
        let inner = self.inner.clone();
        async move { inner.get("/students", &[]).await }
      })
      .await?;

    // Write through each student under its own id so by-id lookups work
    // offline after a list fetch
    if !result.is_from_cache() {
      for student in &result.data {
        self.cache.put_entity(student);
      }
    }

    Ok(result)
  }

  /// Get a single student by id.
  pub async fn student(&self, id: &str) -> ApiResult<CacheResult<Student>> {
    let path = format!("/students/{}", id);
    self
      .cache
      .fetch(Bucket::Students, id, Student::ttl(), || {
        let inner = self.inner.clone();
        async move { inner.get(&path, &[]).await }
      })
      .await
  }

  /// List mentor feedback for an application.
  pub async fn feedback_for(&self, application_id: &str) -> ApiResult<CacheResult<Vec<Feedback>>> {
    let path = format!("/applications/{}/feedback", application_id);
    let key = RequestKey::get(path.clone());
    self
      .cache
      .fetch(Bucket::Feedback, &key.cache_hash(), Feedback::ttl(), || {
        let inner = self.inner.clone();
        async move { inner.get(&path, &[]).await }
      })
      .await
  }

  /// List applications, optionally filtered by stage.
  pub async fn applications(
    &self,
    stage: Option<ApplicationStage>,
  ) -> ApiResult<CacheResult<Vec<Application>>> {
    let mut key = RequestKey::get("/applications");
    let mut params: Vec<(String, String)> = Vec::new();
    if let Some(stage) = stage {
      key = key.with_param("stage", stage.to_string());
      params.push(("stage".to_string(), stage.to_string()));
    }

    self
      .cache
      .fetch(Bucket::Cache, &key.cache_hash(), COLLECTION_TTL, || {
        let inner = self.inner.clone();
        async move { inner.get("/applications", &params).await }
      })
      .await
  }

  /// The signed-in user's profile.
  pub async fn profile(&self) -> ApiResult<CacheResult<Profile>> {
    let key = RequestKey::get("/profile");
    self
      .cache
      .fetch(Bucket::Profile, &key.cache_hash(), Profile::ttl(), || {
        let inner = self.inner.clone();
        async move { inner.get("/profile", &[]).await }
      })
      .await
  }

  /// Submit mentor feedback; queued for replay when offline.
  pub async fn submit_feedback(
    &self,
    application_id: &str,
    rating: u8,
    comment: &str,
  ) -> ApiResult<MutationOutcome<Feedback>> {
    let action = PendingAction::SubmitFeedback {
      application_id: application_id.to_string(),
      rating,
      comment: comment.to_string(),
    };
    self.run_mutation(action).await
  }

  /// Update the signed-in user's profile; queued for replay when offline.
  pub async fn update_profile(
    &self,
    name: Option<String>,
    bio: Option<String>,
  ) -> ApiResult<MutationOutcome<Profile>> {
    let action = PendingAction::UpdateProfile { name, bio };
    self.run_mutation(action).await
  }

  /// Log a new application; queued for replay when offline.
  pub async fn create_application(
    &self,
    company: &str,
    role: &str,
  ) -> ApiResult<MutationOutcome<Application>> {
    let action = PendingAction::CreateApplication {
      company: company.to_string(),
      role: role.to_string(),
    };
    self.run_mutation(action).await
  }

  /// Move an application to a new stage; queued for replay when offline.
  pub async fn update_application_stage(
    &self,
    application_id: &str,
    stage: ApplicationStage,
  ) -> ApiResult<MutationOutcome<Application>> {
    let action = PendingAction::UpdateApplicationStage {
      application_id: application_id.to_string(),
      stage,
    };
    self.run_mutation(action).await
  }

  /// Replay queued offline mutations in enqueue order.
  pub async fn process_offline_queue(&self) -> ReplaySummary {
    self
      .cache
      .replay(|action: PendingAction| {
        let inner = self.inner.clone();
        async move {
          let (path, body) = action_request(&action);
          let _: Value = match &action {
            PendingAction::UpdateProfile { .. }
            | PendingAction::UpdateApplicationStage { .. } => inner.put(&path, body).await?,
            _ => inner.post(&path, body).await?,
          };
          Ok(())
        }
      })
      .await
  }

  /// Mutations currently waiting for replay.
  pub fn queued_actions(&self) -> Vec<(PendingAction, chrono::DateTime<chrono::Utc>)> {
    self
      .cache
      .store()
      .queued_actions::<PendingAction>()
      .map(|queued| queued.into_iter().map(|q| (q.action, q.queued_at)).collect())
      .unwrap_or_default()
  }

  pub fn clear_cache(&self, bucket: Bucket) {
    self.cache.clear(bucket);
  }

  async fn run_mutation<T>(&self, action: PendingAction) -> ApiResult<MutationOutcome<T>>
  where
    T: serde::de::DeserializeOwned,
  {
    let (path, body) = action_request(&action);
    self
      .cache
      .mutate(&action, || {
        let inner = self.inner.clone();
        let is_put = matches!(
          action,
          PendingAction::UpdateProfile { .. } | PendingAction::UpdateApplicationStage { .. }
        );
        async move {
          if is_put {
            inner.put(&path, body).await
          } else {
            inner.post(&path, body).await
          }
        }
      })
      .await
  }
}

/// Endpoint and body for a mutation, shared by the direct path and replay.
fn action_request(action: &PendingAction) -> (String, Value) {
  match action {
    PendingAction::SubmitFeedback {
      application_id,
      rating,
      comment,
    } => (
      format!("/applications/{}/feedback", application_id),
      json!({ "rating": rating, "comment": comment }),
    ),
    PendingAction::UpdateProfile { name, bio } => (
      "/profile".to_string(),
      json!({ "name": name, "bio": bio }),
    ),
    PendingAction::CreateApplication { company, role } => (
      "/applications".to_string(),
      json!({ "company": company, "role": role }),
    ),
    PendingAction::UpdateApplicationStage {
      application_id,
      stage,
    } => (
      format!("/applications/{}/stage", application_id),
      json!({ "stage": stage }),
    ),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_action_request_routes() {
    let (path, body) = action_request(&PendingAction::SubmitFeedback {
      application_id: "app-7".to_string(),
      rating: 5,
      comment: "Great prep".to_string(),
    });
    assert_eq!(path, "/applications/app-7/feedback");
    assert_eq!(body["rating"], 5);

    let (path, body) = action_request(&PendingAction::UpdateApplicationStage {
      application_id: "app-7".to_string(),
      stage: ApplicationStage::Offer,
    });
    assert_eq!(path, "/applications/app-7/stage");
    assert_eq!(body["stage"], "offer");
  }
}
