//! Serde-deserializable types matching platform API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::error::ApiError;

/// Optional response envelope used by most platform endpoints.
///
/// `{ success, data?, error? { message, code }, message? }` - `success:false`
/// fails the request regardless of the HTTP status.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
  pub success: bool,
  #[serde(default)]
  pub data: Option<Value>,
  #[serde(default)]
  pub error: Option<ApiErrorBody>,
  #[serde(default)]
  pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub code: Option<String>,
}

impl ApiEnvelope {
  /// The error message carried by a failed envelope, if any.
  pub fn error_message(&self) -> Option<String> {
    self
      .error
      .as_ref()
      .and_then(|e| e.message.clone())
      .or_else(|| self.message.clone())
  }

  /// The server-provided error code, if any.
  pub fn error_code(&self) -> Option<String> {
    self.error.as_ref().and_then(|e| e.code.clone())
  }
}

/// Unwrap the envelope from a parsed JSON body.
///
/// Bodies without a `success` field pass through unchanged. Enveloped
/// bodies yield their `data` field, or the whole remaining body when
/// `data` is absent. A `success:false` envelope fails with the HTTP
/// status it arrived under, keeping it out of the retryable set.
pub fn unwrap_envelope(body: Value, status: u16) -> Result<Value, ApiError> {
  let envelope: ApiEnvelope = match serde_json::from_value(body.clone()) {
    Ok(env) => env,
    // Not an envelope, the body is the payload
    Err(_) => return Ok(body),
  };

  if !envelope.success {
    return Err(ApiError::Network {
      message: envelope
        .error_message()
        .unwrap_or_else(|| "The request failed".to_string()),
      status: Some(status),
      code: envelope.error_code(),
    });
  }

  Ok(envelope.data.unwrap_or(body))
}

/// Parse the `errors` map out of a 400/422 response body.
pub fn parse_field_errors(body: &Value) -> Option<BTreeMap<String, String>> {
  let errors = body.get("errors")?.as_object()?;
  Some(
    errors
      .iter()
      .map(|(field, msg)| {
        let text = match msg {
          Value::String(s) => s.clone(),
          other => other.to_string(),
        };
        (field.clone(), text)
      })
      .collect(),
  )
}

/// Pull the top-level error message out of a failure body.
pub fn parse_error_message(body: &Value) -> Option<String> {
  body
    .get("error")
    .and_then(|e| e.get("message"))
    .or_else(|| body.get("message"))
    .and_then(|m| m.as_str())
    .map(String::from)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_unwrap_envelope_with_data() {
    let body = json!({ "success": true, "data": [1, 2, 3] });
    assert_eq!(unwrap_envelope(body, 200).unwrap(), json!([1, 2, 3]));
  }

  #[test]
  fn test_unwrap_plain_body_passes_through() {
    let body = json!({ "id": "s1", "name": "Ada" });
    assert_eq!(unwrap_envelope(body.clone(), 200).unwrap(), body);
  }

  #[test]
  fn test_unwrap_failed_envelope_is_an_error() {
    let body = json!({
      "success": false,
      "error": { "message": "quota exceeded", "code": "QUOTA" }
    });
    match unwrap_envelope(body, 200) {
      Err(err @ ApiError::Network { .. }) => {
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(err.status(), Some(200));
        // A failed envelope under a 2xx must not be retried
        assert!(!err.is_retryable());
      }
      other => panic!("expected Network error, got {:?}", other),
    }
  }

  #[test]
  fn test_parse_field_errors() {
    let body = json!({ "errors": { "email": "is required", "rating": "out of range" } });
    let fields = parse_field_errors(&body).unwrap();
    assert_eq!(fields.get("email").unwrap(), "is required");
    assert_eq!(fields.get("rating").unwrap(), "out of range");
  }

  #[test]
  fn test_parse_error_message_fallbacks() {
    let nested = json!({ "error": { "message": "boom" } });
    assert_eq!(parse_error_message(&nested).as_deref(), Some("boom"));

    let flat = json!({ "message": "flat boom" });
    assert_eq!(parse_error_message(&flat).as_deref(), Some("flat boom"));
  }
}
