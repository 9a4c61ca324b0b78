//! Platform API client wrapper.
//!
//! Wraps network calls with a per-attempt timeout, bounded retry with
//! exponential backoff, bearer auth, and classification of failures into
//! the [`ApiError`] taxonomy. Successful bodies are unwrapped from the
//! platform's optional response envelope.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::Config;

use super::api_types::{parse_error_message, parse_field_errors, unwrap_envelope};
use super::error::{ApiError, ApiResult};
use super::retry::{self, RetryPolicy};

/// Resilient HTTP client for the platform REST API.
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: String,
  /// Bearer token; cleared in place when the server answers 401
  token: Arc<Mutex<Option<String>>>,
  policy: RetryPolicy,
  timeout: Duration,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    // Validate early so a bad config fails at startup, not mid-request
    let base_url = Url::parse(&config.api.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.api.base_url, e))?;

    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      http,
      base_url: base_url.as_str().trim_end_matches('/').to_string(),
      token: Arc::new(Mutex::new(Config::get_api_token().ok())),
      policy: RetryPolicy::new(
        config.api.retries,
        Duration::from_millis(config.api.retry_delay_ms),
      ),
      timeout: Duration::from_millis(config.api.timeout_ms),
    })
  }

  /// GET returning the decoded payload.
  pub async fn get<T: DeserializeOwned>(
    &self,
    path: &str,
    params: &[(String, String)],
  ) -> ApiResult<T> {
    let value = self.request(Method::GET, path, params, None).await?;
    decode(value)
  }

  /// POST a JSON body, returning the decoded payload.
  pub async fn post<T: DeserializeOwned>(&self, path: &str, body: Value) -> ApiResult<T> {
    let value = self.request(Method::POST, path, &[], Some(body)).await?;
    decode(value)
  }

  /// PUT a JSON body, returning the decoded payload.
  pub async fn put<T: DeserializeOwned>(&self, path: &str, body: Value) -> ApiResult<T> {
    let value = self.request(Method::PUT, path, &[], Some(body)).await?;
    decode(value)
  }

  /// Perform a request with retry. Only retryable failures (5xx, 429,
  /// transport errors) are re-attempted; everything else surfaces on first
  /// occurrence.
  async fn request(
    &self,
    method: Method,
    path: &str,
    params: &[(String, String)],
    body: Option<Value>,
  ) -> ApiResult<Value> {
    retry::run(self.policy, |attempt| {
      let method = method.clone();
      let body = body.clone();
      async move {
        debug!(%method, path, attempt, "sending request");
        self.attempt(method, path, params, body).await
      }
    })
    .await
  }

  /// One network attempt, bounded by the per-attempt timeout.
  async fn attempt(
    &self,
    method: Method,
    path: &str,
    params: &[(String, String)],
    body: Option<Value>,
  ) -> ApiResult<Value> {
    let url = format!("{}{}", self.base_url, path);

    let mut request = self
      .http
      .request(method, &url)
      .timeout(self.timeout)
      .header("Content-Type", "application/json");

    if !params.is_empty() {
      request = request.query(params);
    }
    if let Some(token) = self.current_token() {
      request = request.bearer_auth(token);
    }
    if let Some(body) = body {
      request = request.json(&body);
    }

    let response = request.send().await.map_err(|e| {
      if e.is_timeout() {
        ApiError::transport("The request timed out")
      } else {
        ApiError::transport(format!("Request failed: {}", e))
      }
    })?;

    let status = response.status();
    let is_json = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(|ct| ct.contains("application/json"))
      .unwrap_or(false);

    let text = response
      .text()
      .await
      .map_err(|e| ApiError::transport(format!("Failed to read response body: {}", e)))?;

    if status.is_success() {
      if !is_json {
        // Non-JSON responses surface as raw text
        return Ok(Value::String(text));
      }
      let value: Value = serde_json::from_str(&text).map_err(|e| ApiError::Network {
        message: format!("Invalid JSON in response: {}", e),
        status: Some(status.as_u16()),
        code: None,
      })?;
      return unwrap_envelope(value, status.as_u16());
    }

    Err(self.classify_failure(status, &text))
  }

  /// Classify a non-2xx response. A 401 clears the stored token before
  /// the error is returned.
  fn classify_failure(&self, status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
      self.clear_token();
    }

    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let (message, code, field_errors) = match &parsed {
      Some(body) => (
        parse_error_message(body),
        body
          .get("error")
          .and_then(|e| e.get("code"))
          .and_then(|c| c.as_str())
          .map(String::from),
        parse_field_errors(body),
      ),
      None => (None, None, None),
    };

    ApiError::from_status(status.as_u16(), message, code, field_errors)
  }

  fn current_token(&self) -> Option<String> {
    self.token.lock().ok().and_then(|t| t.clone())
  }

  fn clear_token(&self) {
    if let Ok(mut token) = self.token.lock() {
      *token = None;
    }
  }

  #[cfg(test)]
  fn with_token(self, token: &str) -> Self {
    *self.token.lock().unwrap() = Some(token.to_string());
    self
  }
}

/// Decode a payload into the caller's type.
///
/// Decode failures carry the 200 status they arrived with, which keeps
/// them out of the retryable set.
fn decode<T: DeserializeOwned>(value: Value) -> ApiResult<T> {
  serde_json::from_value(value).map_err(|e| ApiError::Network {
    message: format!("Unexpected response shape: {}", e),
    status: Some(200),
    code: None,
  })
}
