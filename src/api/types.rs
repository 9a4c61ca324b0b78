use serde::{Deserialize, Serialize};

/// A student tracked on the platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
  pub id: String,
  pub name: String,
  pub email: String,
  pub university: Option<String>,
  pub status: String, // "searching", "interviewing", "placed"
  pub updated_at: String,
}

/// An internship application logged by a student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
  pub id: String,
  pub student_id: String,
  pub company: String,
  pub role: String,
  pub stage: ApplicationStage,
  pub submitted_at: String,
  pub updated_at: String,
}

/// Stage of an application in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStage {
  Applied,
  Screening,
  Interview,
  Offer,
  Accepted,
  Rejected,
}

impl std::fmt::Display for ApplicationStage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      Self::Applied => "applied",
      Self::Screening => "screening",
      Self::Interview => "interview",
      Self::Offer => "offer",
      Self::Accepted => "accepted",
      Self::Rejected => "rejected",
    };
    write!(f, "{}", s)
  }
}

impl std::str::FromStr for ApplicationStage {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "applied" => Ok(Self::Applied),
      "screening" => Ok(Self::Screening),
      "interview" => Ok(Self::Interview),
      "offer" => Ok(Self::Offer),
      "accepted" => Ok(Self::Accepted),
      "rejected" => Ok(Self::Rejected),
      other => Err(format!("Unknown application stage: {}", other)),
    }
  }
}

/// Mentor feedback on an application
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feedback {
  pub id: String,
  pub application_id: String,
  pub mentor_id: String,
  /// 1-5
  pub rating: u8,
  pub comment: String,
  pub created_at: String,
  pub updated_at: String,
}

/// The signed-in user's profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
  pub id: String,
  pub name: String,
  pub email: String,
  pub role: String, // "student", "mentor", "admin"
  pub bio: Option<String>,
  pub updated_at: String,
}
