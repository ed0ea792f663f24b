//! User records and the campus role model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The three campus roles. Wire values are the Spanish identifiers used
/// throughout the API (`estudiante`, `personal`, `autoridad`).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
  Estudiante,
  Personal,
  Autoridad,
}

impl Role {
  /// Parse a role from user input, accepting common synonyms
  /// (`student`/`alumno` → estudiante, `staff` → personal,
  /// `authority` → autoridad).
  pub fn normalize(input: &str) -> Result<Self> {
    let key = input.trim().to_lowercase();
    let canonical = match key.as_str() {
      "student" | "alumno" | "estudiantes" => "estudiante",
      "staff" | "personal administrativo" => "personal",
      "authority" => "autoridad",
      other => other,
    };
    canonical.parse().map_err(|_| {
      Error::Validation(
        "Rol inválido. Usa uno de: estudiante, personal, autoridad."
          .to_string(),
      )
    })
  }
}

/// A registered user. The email is the identity key and never changes;
/// the record is never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub email:         String,
  /// Argon2 PHC string; opaque to everything except the login path.
  #[serde(skip_serializing)]
  pub password_hash: String,
  pub role:          Role,
  pub full_name:     String,
  pub status:        String,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
  /// Set on each successful authentication.
  pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
  /// Build an `active` user record with creation timestamps set to now.
  pub fn new(
    email: String,
    password_hash: String,
    role: Role,
    full_name: String,
  ) -> Self {
    let now = Utc::now();
    Self {
      email,
      password_hash,
      role,
      full_name,
      status: "active".to_string(),
      created_at: now,
      updated_at: now,
      last_login_at: None,
    }
  }
}
