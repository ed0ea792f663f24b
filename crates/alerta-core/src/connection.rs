//! Live realtime subscriptions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::Role;

/// One live realtime subscription. Created on subscribe, refreshed on
/// heartbeat, deleted on explicit disconnect — or reactively when a delivery
/// attempt reports the endpoint gone. Rows past `expires_at` are treated as
/// absent by registry queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
  /// Assigned by the transport on subscribe.
  pub connection_id: String,
  pub user:          String,
  pub role:          Role,
  pub connected_at:  DateTime<Utc>,
  pub last_ping_at:  DateTime<Utc>,
  pub expires_at:    DateTime<Utc>,
}
