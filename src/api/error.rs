//! Typed API error taxonomy.
//!
//! Failures are classified once, at the HTTP boundary, into a small closed
//! set of variants that callers can branch on without inspecting raw status
//! codes. The retry loop only ever re-attempts errors flagged retryable.

use std::collections::BTreeMap;

pub type ApiResult<T> = Result<T, ApiError>;

/// Classified request failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
  /// Transport failure or non-2xx HTTP response.
  #[error("{message}")]
  Network {
    message: String,
    /// HTTP status, if a response was received at all
    status: Option<u16>,
    /// Server-provided error code from the response envelope
    code: Option<String>,
  },

  /// 400/422 with structured per-field errors.
  #[error("{message}")]
  Validation {
    message: String,
    /// The originating status, 400 or 422
    status: u16,
    field_errors: BTreeMap<String, String>,
  },

  /// 401 - stored credentials are cleared before this is returned.
  #[error("{message}")]
  Authentication { message: String },

  /// 403.
  #[error("{message}")]
  Authorization { message: String },
}

impl ApiError {
  /// Build a transport-level failure (no HTTP response received).
  pub fn transport(message: impl Into<String>) -> Self {
    Self::Network {
      message: message.into(),
      status: None,
      code: None,
    }
  }

  /// Classify a non-2xx HTTP status plus the server's error message.
  ///
  /// `field_errors` is the parsed `errors` map from a 400/422 body, if any.
  pub fn from_status(
    status: u16,
    message: Option<String>,
    code: Option<String>,
    field_errors: Option<BTreeMap<String, String>>,
  ) -> Self {
    match status {
      400 | 422 => Self::Validation {
        message: message.unwrap_or_else(|| "Validation failed".to_string()),
        status,
        field_errors: field_errors.unwrap_or_default(),
      },
      401 => Self::Authentication {
        message: message.unwrap_or_else(|| "Authentication required".to_string()),
      },
      403 => Self::Authorization {
        message: message.unwrap_or_else(|| "You do not have permission to do that".to_string()),
      },
      _ => Self::Network {
        message: message.unwrap_or_else(|| default_status_message(status).to_string()),
        status: Some(status),
        code,
      },
    }
  }

  /// Whether the retry loop may re-attempt this failure.
  ///
  /// Retryable: 5xx, 429, and raw transport failures (no status at all).
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Network { status, .. } => match status {
        Some(s) => *s >= 500 || *s == 429,
        None => true,
      },
      _ => false,
    }
  }

  /// The HTTP status this error was built from, if any.
  pub fn status(&self) -> Option<u16> {
    match self {
      Self::Network { status, .. } => *status,
      Self::Validation { status, .. } => Some(*status),
      Self::Authentication { .. } => Some(401),
      Self::Authorization { .. } => Some(403),
    }
  }

  /// User-facing text for this failure.
  pub fn user_message(&self) -> String {
    match self {
      Self::Network { status, message, .. } => match status {
        Some(s) => default_status_message(*s).to_string(),
        None => {
          if message.contains("timed out") {
            "The request timed out. Please try again.".to_string()
          } else {
            "Could not reach the server. Check your connection.".to_string()
          }
        }
      },
      Self::Validation { field_errors, message, .. } => {
        if field_errors.is_empty() {
          message.clone()
        } else {
          field_errors
            .iter()
            .map(|(field, msg)| format!("{}: {}", field, msg))
            .collect::<Vec<_>>()
            .join("; ")
        }
      }
      Self::Authentication { .. } => "Your session has expired. Please sign in again.".to_string(),
      Self::Authorization { .. } => "You do not have permission to do that.".to_string(),
    }
  }
}

/// Human-readable message for a status the server gave no message for.
fn default_status_message(status: u16) -> &'static str {
  match status {
    404 => "The requested resource was not found",
    409 => "This conflicts with an existing record",
    429 => "Too many requests. Please slow down",
    500 => "The server hit an internal error",
    502 => "The server is temporarily unreachable",
    503 => "The service is temporarily unavailable",
    504 => "The server took too long to respond",
    s if s >= 500 => "The server hit an unexpected error",
    _ => "The request failed",
  }
}
