//! Mutations that can be queued while offline.
//!
//! Each variant carries its own typed payload, so replay dispatches by
//! pattern match rather than a string-keyed lookup. The enum is what gets
//! serialized into the offline queue.

use serde::{Deserialize, Serialize};

use super::types::ApplicationStage;

/// A mutation recorded for later replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum PendingAction {
  SubmitFeedback {
    application_id: String,
    rating: u8,
    comment: String,
  },
  UpdateProfile {
    name: Option<String>,
    bio: Option<String>,
  },
  CreateApplication {
    company: String,
    role: String,
  },
  UpdateApplicationStage {
    application_id: String,
    stage: ApplicationStage,
  },
}

impl PendingAction {
  /// Short human-readable label for logs and the sync command.
  pub fn describe(&self) -> String {
    match self {
      Self::SubmitFeedback { application_id, .. } => {
        format!("feedback on application {}", application_id)
      }
      Self::UpdateProfile { .. } => "profile update".to_string(),
      Self::CreateApplication { company, role } => {
        format!("application to {} for {}", company, role)
      }
      Self::UpdateApplicationStage { application_id, stage } => {
        format!("application {} moved to {}", application_id, stage)
      }
    }
  }
}
