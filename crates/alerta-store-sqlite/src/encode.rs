//! Column encoding/decoding between domain types and TEXT columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC (`...Z`, microsecond
//! precision) so lexicographic comparison in SQL matches chronological order;
//! the connection-expiry queries rely on this.

use std::collections::BTreeSet;

use alerta_core::{
  Error, Result,
  connection::Connection,
  incident::{Comment, HistoryEntry, Incident},
  user::User,
};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String {
  id.to_string()
}

pub fn parse_uuid(s: &str) -> Result<Uuid> {
  Uuid::parse_str(s).map_err(Error::internal)
}

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(Error::internal)
}

/// Parse a stored enum discriminant (role, status, severity, action).
/// A failure here means the database text is corrupt, not bad caller input.
pub fn parse_enum<T: std::str::FromStr>(s: &str) -> Result<T>
where
  T::Err: std::fmt::Display,
{
  s.parse().map_err(Error::internal)
}

// ─── Raw row types ───────────────────────────────────────────────────────────

/// An `incidents` row exactly as stored; decoded outside the connection
/// thread.
pub struct RawIncident {
  pub incident_id:        String,
  pub kind:               String,
  pub location:           String,
  pub description:        String,
  pub urgency:            String,
  pub priority:           String,
  pub status:             String,
  pub reported_by:        String,
  pub reporter_role:      String,
  pub assigned_to:        Option<String>,
  pub significance_count: i64,
  pub created_at:         String,
  pub updated_at:         String,
  pub last_note:          Option<String>,
}

pub struct RawComment {
  pub comment_id: String,
  pub text:       String,
  pub actor:      String,
  pub actor_role: String,
  pub timestamp:  String,
}

pub struct RawHistoryEntry {
  pub action:      String,
  pub actor:       String,
  pub actor_role:  String,
  pub timestamp:   String,
  pub new_status:  Option<String>,
  pub priority:    Option<String>,
  pub assigned_to: Option<String>,
  pub note:        Option<String>,
}

pub struct RawUser {
  pub email:         String,
  pub password_hash: String,
  pub role:          String,
  pub full_name:     String,
  pub status:        String,
  pub created_at:    String,
  pub updated_at:    String,
  pub last_login_at: Option<String>,
}

pub struct RawConnection {
  pub connection_id: String,
  pub user_email:    String,
  pub role:          String,
  pub connected_at:  String,
  pub last_ping_at:  String,
  pub expires_at:    String,
}

/// An incident row together with its child rows, fetched in one closure.
pub struct RawIncidentBundle {
  pub incident: RawIncident,
  pub comments: Vec<RawComment>,
  pub history:  Vec<RawHistoryEntry>,
  pub voters:   Vec<String>,
}

// ─── Encoding ────────────────────────────────────────────────────────────────

/// Encode a history entry to its column form. `RawHistoryEntry` is symmetric:
/// it is both what gets inserted and what comes back out.
pub fn encode_history(entry: &HistoryEntry) -> RawHistoryEntry {
  RawHistoryEntry {
    action:      entry.action.to_string(),
    actor:       entry.by.clone(),
    actor_role:  entry.role.to_string(),
    timestamp:   encode_dt(entry.timestamp),
    new_status:  entry.new_status.map(|s| s.to_string()),
    priority:    entry.priority.map(|p| p.to_string()),
    assigned_to: entry.assigned_to.clone(),
    note:        entry.note.clone(),
  }
}

pub fn encode_comment(comment: &Comment) -> RawComment {
  RawComment {
    comment_id: encode_uuid(comment.comment_id),
    text:       comment.text.clone(),
    actor:      comment.by.clone(),
    actor_role: comment.role.to_string(),
    timestamp:  encode_dt(comment.timestamp),
  }
}

// ─── Decoding ────────────────────────────────────────────────────────────────

impl RawComment {
  pub fn into_comment(self) -> Result<Comment> {
    Ok(Comment {
      comment_id: parse_uuid(&self.comment_id)?,
      text:       self.text,
      by:         self.actor,
      role:       parse_enum(&self.actor_role)?,
      timestamp:  parse_dt(&self.timestamp)?,
    })
  }
}

impl RawHistoryEntry {
  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      action:      parse_enum(&self.action)?,
      by:          self.actor,
      role:        parse_enum(&self.actor_role)?,
      timestamp:   parse_dt(&self.timestamp)?,
      new_status:  self.new_status.as_deref().map(parse_enum).transpose()?,
      priority:    self.priority.as_deref().map(parse_enum).transpose()?,
      assigned_to: self.assigned_to,
      note:        self.note,
    })
  }
}

impl RawUser {
  pub fn into_user(self) -> Result<User> {
    Ok(User {
      email:         self.email,
      password_hash: self.password_hash,
      role:          parse_enum(&self.role)?,
      full_name:     self.full_name,
      status:        self.status,
      created_at:    parse_dt(&self.created_at)?,
      updated_at:    parse_dt(&self.updated_at)?,
      last_login_at: self.last_login_at.as_deref().map(parse_dt).transpose()?,
    })
  }
}

impl RawConnection {
  pub fn into_connection(self) -> Result<Connection> {
    Ok(Connection {
      connection_id: self.connection_id,
      user:          self.user_email,
      role:          parse_enum(&self.role)?,
      connected_at:  parse_dt(&self.connected_at)?,
      last_ping_at:  parse_dt(&self.last_ping_at)?,
      expires_at:    parse_dt(&self.expires_at)?,
    })
  }
}

impl RawIncidentBundle {
  pub fn into_incident(self) -> Result<Incident> {
    let r = self.incident;
    Ok(Incident {
      incident_id:         parse_uuid(&r.incident_id)?,
      kind:                r.kind,
      location:            r.location,
      description:         r.description,
      urgency:             parse_enum(&r.urgency)?,
      priority:            parse_enum(&r.priority)?,
      status:              parse_enum(&r.status)?,
      reported_by:         r.reported_by,
      reporter_role:       parse_enum(&r.reporter_role)?,
      assigned_to:         r.assigned_to,
      comments:            self
        .comments
        .into_iter()
        .map(RawComment::into_comment)
        .collect::<Result<_>>()?,
      significance_voters: self.voters.into_iter().collect::<BTreeSet<_>>(),
      significance_count:  r.significance_count as u64,
      history:             self
        .history
        .into_iter()
        .map(RawHistoryEntry::into_entry)
        .collect::<Result<_>>()?,
      created_at:          parse_dt(&r.created_at)?,
      updated_at:          parse_dt(&r.updated_at)?,
      last_note:           r.last_note,
    })
  }
}
