//! Incident records, their append-only audit history, and the typed
//! mutation descriptor consumed by the store.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Severity scale shared by `urgency` (immutable, set at creation) and
/// `priority` (mutable, defaults to the urgency).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
  Baja,
  Media,
  Alta,
  Critica,
}

impl Severity {
  /// Sort weight used by staff list views: critica outranks baja.
  pub fn weight(self) -> u8 {
    match self {
      Self::Critica => 4,
      Self::Alta => 3,
      Self::Media => 2,
      Self::Baja => 1,
    }
  }
}

/// Incident status. Any valid status may be set at any time; there is no
/// enforced forward-only transition graph. Whether reverting a resolved
/// incident to `pendiente` is intended is an open product question — the
/// engine stays permissive.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Status {
  Pendiente,
  EnAtencion,
  Resuelto,
}

// ─── History ─────────────────────────────────────────────────────────────────

/// Discriminant for audit entries. One entry is appended per successful
/// mutating operation, so `history.len()` always equals the number of
/// mutations ever applied.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
  Created,
  StatusChange,
  PriorityChange,
  Assignment,
  Comment,
  SignificanceUpvote,
}

/// One audit entry. Action-specific fields are optional and omitted from the
/// wire form when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  pub action:    HistoryAction,
  pub by:        String,
  pub role:      crate::user::Role,
  pub timestamp: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub new_status: Option<Status>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub priority: Option<Severity>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assigned_to: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

impl HistoryEntry {
  /// An entry with no action-specific fields, timestamped now.
  pub fn new(
    action: HistoryAction,
    by: String,
    role: crate::user::Role,
  ) -> Self {
    Self {
      action,
      by,
      role,
      timestamp: Utc::now(),
      new_status: None,
      priority: None,
      assigned_to: None,
      note: None,
    }
  }
}

// ─── Comments ────────────────────────────────────────────────────────────────

/// An append-only comment on an incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
  pub comment_id: Uuid,
  pub text:       String,
  pub by:         String,
  pub role:       crate::user::Role,
  pub timestamp:  DateTime<Utc>,
}

// ─── Incident ────────────────────────────────────────────────────────────────

/// A reported incident with its full audit trail.
///
/// `significance_voters` is a canonical set — membership is unique and the
/// serialized form is a stable sorted sequence. `significance_count` is kept
/// equal to the set's cardinality by the store's atomic vote operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
  pub incident_id: Uuid,
  #[serde(rename = "type")]
  pub kind:        String,
  pub location:    String,
  pub description: String,
  /// Set at creation; never changes afterwards.
  pub urgency:  Severity,
  pub priority: Severity,
  pub status:   Status,
  pub reported_by:   String,
  pub reporter_role: crate::user::Role,
  /// When present, always names a user whose role is `personal`.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub assigned_to: Option<String>,
  pub comments: Vec<Comment>,
  pub significance_voters: BTreeSet<String>,
  pub significance_count:  u64,
  pub history:    Vec<HistoryEntry>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub last_note: Option<String>,
}

// ─── Mutation descriptor ─────────────────────────────────────────────────────

/// Typed attribute set applied by
/// [`conditional_update`](crate::store::IncidentStore::conditional_update).
/// A closed set of fields with optional presence; the store adapter builds
/// the underlying atomic update from it.
#[derive(Debug, Clone, Default)]
pub struct IncidentPatch {
  pub status:      Option<Status>,
  pub priority:    Option<Severity>,
  pub assigned_to: Option<String>,
  pub last_note:   Option<String>,
}

impl IncidentPatch {
  pub fn is_empty(&self) -> bool {
    self.status.is_none()
      && self.priority.is_none()
      && self.assigned_to.is_none()
      && self.last_note.is_none()
  }
}
