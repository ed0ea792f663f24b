//! Realtime event envelope.

use serde::{Deserialize, Serialize};

/// Event tags delivered to subscribers. Wire values are dotted identifiers
/// (`incident.created`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
  #[serde(rename = "incident.created")]
  IncidentCreated,
  #[serde(rename = "incident.updated")]
  IncidentUpdated,
  #[serde(rename = "incident.assigned")]
  IncidentAssigned,
  #[serde(rename = "incident.priority")]
  IncidentPriority,
  #[serde(rename = "incident.comment")]
  IncidentComment,
  #[serde(rename = "incident.significance")]
  IncidentSignificance,
}

impl EventType {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::IncidentCreated => "incident.created",
      Self::IncidentUpdated => "incident.updated",
      Self::IncidentAssigned => "incident.assigned",
      Self::IncidentPriority => "incident.priority",
      Self::IncidentComment => "incident.comment",
      Self::IncidentSignificance => "incident.significance",
    }
  }
}

/// The envelope pushed to every subscriber: `{"type": ..., "data": ...}`.
/// The payload is the full incident record for created/updated/assigned/
/// priority events, and a minimal diff for comments and votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
  #[serde(rename = "type")]
  pub event: EventType,
  pub data:  serde_json::Value,
}
