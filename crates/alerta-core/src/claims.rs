//! Verified identity claims.
//!
//! Credential issuance and signature verification belong to the transport
//! layer; the engine only ever consumes an already-verified [`Claims`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::Role;

/// The result of verifying a bearer credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  /// The user's identity key (their email).
  pub subject:    String,
  pub role:       Role,
  pub expires_at: DateTime<Utc>,
}

impl Claims {
  pub fn new(subject: String, role: Role, expires_at: DateTime<Utc>) -> Self {
    Self { subject, role, expires_at }
  }

  pub fn is_expired(&self) -> bool {
    self.expires_at < Utc::now()
  }
}
