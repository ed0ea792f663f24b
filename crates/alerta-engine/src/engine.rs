//! The incident lifecycle engine.
//!
//! Every mutating operation follows the same shape: guard the caller's role,
//! normalize and validate input, delegate exactly one atomic call to the
//! store, fan out an event, and return the updated record. Store-reported
//! not-found and conflict errors pass through unchanged; fan-out failures
//! never surface.

use std::sync::Arc;

use alerta_core::{
  Error, Result,
  claims::Claims,
  incident::{
    Comment, HistoryAction, HistoryEntry, Incident, IncidentPatch, Severity,
    Status,
  },
  store::{ConnectionRegistry, IncidentStore, UserStore},
  user::{Role, User},
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::{
  event::EventType,
  fanout::{DeliverySink, Notifier},
  guard,
};

/// Roles with a staff-wide view of incidents.
const STAFF_ROLES: [Role; 2] = [Role::Personal, Role::Autoridad];

// ─── Inputs and outputs ──────────────────────────────────────────────────────

/// Raw creation input. Enum fields arrive as text and are normalized here,
/// so transport layers stay thin.
#[derive(Debug, Clone)]
pub struct NewIncidentInput {
  pub kind:        String,
  pub location:    String,
  pub description: String,
  pub urgency:     String,
  pub note:        Option<String>,
}

/// Multi-value filters for the staff list view. Values are raw text,
/// normalized per entry.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
  pub statuses:   Option<Vec<String>>,
  pub urgencies:  Option<Vec<String>>,
  pub priorities: Option<Vec<String>>,
}

/// A staff directory entry, as exposed to the assignment UI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffMember {
  pub email:     String,
  pub full_name: String,
}

impl From<User> for StaffMember {
  fn from(user: User) -> Self {
    Self { email: user.email, full_name: user.full_name }
  }
}

/// Per-status counts attached to the staff list view.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StatusCounts {
  pub pendiente:   usize,
  pub en_atencion: usize,
  pub resuelto:    usize,
}

/// The staff list view: filtered incidents sorted by priority weight then
/// creation time, newest and most urgent first, plus a status summary.
#[derive(Debug, Clone, Serialize)]
pub struct AdminListing {
  pub stats:     StatusCounts,
  pub incidents: Vec<Incident>,
}

// ─── Validation helpers ──────────────────────────────────────────────────────

fn parse_severity(value: &str) -> Result<Severity> {
  value.trim().to_lowercase().parse().map_err(|_| {
    Error::Validation(
      "Urgencia inválida. Usa baja, media, alta o critica.".to_string(),
    )
  })
}

fn parse_status(value: &str) -> Result<Status> {
  value.trim().to_lowercase().parse().map_err(|_| {
    Error::Validation(
      "Estado inválido. Usa pendiente, en_atencion o resuelto.".to_string(),
    )
  })
}

fn clean_note(note: Option<String>) -> Option<String> {
  note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

/// All-or-nothing required-field check; names every missing field at once.
fn require_fields(fields: &[(&str, &str)]) -> Result<()> {
  let missing: Vec<&str> = fields
    .iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| *name)
    .collect();
  if missing.is_empty() {
    Ok(())
  } else {
    Err(Error::Validation(format!("Faltan campos: {}", missing.join(", "))))
  }
}

// ─── Fan-out payloads ────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IncidentPayload<'a> {
  incident: &'a Incident,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AssignmentPayload<'a> {
  incident:    &'a Incident,
  assigned_by: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommentPayload<'a> {
  incident_id: Uuid,
  comment:     &'a Comment,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignificancePayload {
  incident_id:        Uuid,
  significance_count: u64,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Orchestrates guards, validation, the store, and fan-out. Stateless apart
/// from its injected handles; cheap to clone and share across requests.
pub struct LifecycleEngine<S, R, D> {
  store:    Arc<S>,
  notifier: Notifier<R, D>,
}

impl<S, R, D> Clone for LifecycleEngine<S, R, D> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), notifier: self.notifier.clone() }
  }
}

impl<S, R, D> LifecycleEngine<S, R, D>
where
  S: IncidentStore + UserStore,
  R: ConnectionRegistry,
  D: DeliverySink,
{
  pub fn new(store: Arc<S>, notifier: Notifier<R, D>) -> Self {
    Self { store, notifier }
  }

  /// Report a new incident. Any authenticated role. Status starts at
  /// `pendiente` and priority defaults to the urgency.
  pub async fn create_incident(
    &self,
    claims: &Claims,
    input: NewIncidentInput,
  ) -> Result<Incident> {
    guard::authenticate(claims)?;
    require_fields(&[
      ("type", &input.kind),
      ("location", &input.location),
      ("description", &input.description),
      ("urgency", &input.urgency),
    ])?;
    let urgency = parse_severity(&input.urgency)?;
    let note = clean_note(input.note);

    let now = Utc::now();
    let mut entry = HistoryEntry::new(
      HistoryAction::Created,
      claims.subject.clone(),
      claims.role,
    );
    entry.note = note.clone();

    let incident = Incident {
      incident_id: Uuid::new_v4(),
      kind: input.kind.trim().to_string(),
      location: input.location.trim().to_string(),
      description: input.description.trim().to_string(),
      urgency,
      priority: urgency,
      status: Status::Pendiente,
      reported_by: claims.subject.clone(),
      reporter_role: claims.role,
      assigned_to: None,
      comments: Vec::new(),
      significance_voters: Default::default(),
      significance_count: 0,
      history: vec![entry],
      created_at: now,
      updated_at: now,
      last_note: note,
    };
    self.store.create(incident.clone()).await?;

    let payload = IncidentPayload { incident: &incident };
    self
      .notifier
      .broadcast_to_roles(&STAFF_ROLES, EventType::IncidentCreated, &payload)
      .await;
    self
      .notifier
      .notify_user(&claims.subject, EventType::IncidentCreated, &payload)
      .await;
    Ok(incident)
  }

  /// Set the status. Staff only; the optional note is stored as `last_note`
  /// and echoed into the history entry.
  pub async fn change_status(
    &self,
    claims: &Claims,
    incident_id: Uuid,
    status: &str,
    note: Option<String>,
  ) -> Result<Incident> {
    guard::require_role(claims, &STAFF_ROLES)?;
    let status = parse_status(status)?;
    let note = clean_note(note);

    let mut entry = HistoryEntry::new(
      HistoryAction::StatusChange,
      claims.subject.clone(),
      claims.role,
    );
    entry.new_status = Some(status);
    entry.note = note.clone();
    let patch =
      IncidentPatch { status: Some(status), last_note: note, ..Default::default() };

    let incident =
      self.store.conditional_update(incident_id, patch, entry).await?;
    self.fan_out_update(EventType::IncidentUpdated, &incident).await;
    Ok(incident)
  }

  /// Set the priority. Autoridad only.
  pub async fn set_priority(
    &self,
    claims: &Claims,
    incident_id: Uuid,
    priority: &str,
    note: Option<String>,
  ) -> Result<Incident> {
    guard::require_role(claims, &[Role::Autoridad])?;
    let priority = parse_severity(priority)?;
    let note = clean_note(note);

    let mut entry = HistoryEntry::new(
      HistoryAction::PriorityChange,
      claims.subject.clone(),
      claims.role,
    );
    entry.priority = Some(priority);
    entry.note = note.clone();
    let patch = IncidentPatch {
      priority: Some(priority),
      last_note: note,
      ..Default::default()
    };

    let incident =
      self.store.conditional_update(incident_id, patch, entry).await?;
    self.fan_out_update(EventType::IncidentPriority, &incident).await;
    Ok(incident)
  }

  /// Assign the incident to a staff member. Autoridad only; the target must
  /// exist and hold role `personal`.
  pub async fn assign_to(
    &self,
    claims: &Claims,
    incident_id: Uuid,
    assignee: &str,
  ) -> Result<Incident> {
    guard::require_role(claims, &[Role::Autoridad])?;
    let assignee = assignee.trim();
    if assignee.is_empty() {
      return Err(Error::Validation("assignedTo es requerido".to_string()));
    }
    let target = self
      .store
      .get_user(assignee.to_string())
      .await?
      .ok_or_else(|| Error::UserNotFound(assignee.to_string()))?;
    if target.role != Role::Personal {
      return Err(Error::Validation(
        "Solo se puede asignar a usuarios con rol personal".to_string(),
      ));
    }

    let mut entry = HistoryEntry::new(
      HistoryAction::Assignment,
      claims.subject.clone(),
      claims.role,
    );
    entry.assigned_to = Some(assignee.to_string());
    let patch = IncidentPatch {
      assigned_to: Some(assignee.to_string()),
      ..Default::default()
    };

    let incident =
      self.store.conditional_update(incident_id, patch, entry).await?;

    self
      .notifier
      .notify_user(
        assignee,
        EventType::IncidentAssigned,
        &AssignmentPayload { incident: &incident, assigned_by: &claims.subject },
      )
      .await;
    self
      .notifier
      .broadcast_to_roles(
        &[Role::Autoridad],
        EventType::IncidentAssigned,
        &IncidentPayload { incident: &incident },
      )
      .await;
    Ok(incident)
  }

  /// Append a comment. Restricted to estudiante.
  pub async fn add_comment(
    &self,
    claims: &Claims,
    incident_id: Uuid,
    text: &str,
  ) -> Result<(Incident, Comment)> {
    guard::require_role(claims, &[Role::Estudiante])?;
    let text = text.trim();
    if text.is_empty() {
      return Err(Error::Validation(
        "El comentario no puede estar vacío".to_string(),
      ));
    }

    let comment = Comment {
      comment_id: Uuid::new_v4(),
      text:       text.to_string(),
      by:         claims.subject.clone(),
      role:       claims.role,
      timestamp:  Utc::now(),
    };
    let mut entry = HistoryEntry::new(
      HistoryAction::Comment,
      claims.subject.clone(),
      claims.role,
    );
    entry.note = Some(text.to_string());

    let incident = self
      .store
      .append_comment(incident_id, comment.clone(), entry)
      .await?;

    let payload = CommentPayload { incident_id, comment: &comment };
    self
      .notifier
      .broadcast_to_roles(&STAFF_ROLES, EventType::IncidentComment, &payload)
      .await;
    if incident.reported_by != claims.subject {
      self
        .notifier
        .notify_user(
          &incident.reported_by,
          EventType::IncidentComment,
          &payload,
        )
        .await;
    }
    Ok((incident, comment))
  }

  /// Record a significance vote. Any authenticated role, one vote per user;
  /// a duplicate surfaces the store's conflict unchanged.
  pub async fn vote_significance(
    &self,
    claims: &Claims,
    incident_id: Uuid,
  ) -> Result<Incident> {
    guard::authenticate(claims)?;

    let entry = HistoryEntry::new(
      HistoryAction::SignificanceUpvote,
      claims.subject.clone(),
      claims.role,
    );
    let incident = self
      .store
      .add_significance_vote(incident_id, claims.subject.clone(), entry)
      .await?;

    let payload = SignificancePayload {
      incident_id,
      significance_count: incident.significance_count,
    };
    self
      .notifier
      .broadcast_to_roles(
        &STAFF_ROLES,
        EventType::IncidentSignificance,
        &payload,
      )
      .await;
    if incident.reported_by != claims.subject {
      self
        .notifier
        .notify_user(
          &incident.reported_by,
          EventType::IncidentSignificance,
          &payload,
        )
        .await;
    }
    Ok(incident)
  }

  /// List incidents, optionally filtered by one status. Estudiante sees only
  /// their own reports; staff see everything.
  pub async fn list_incidents(
    &self,
    claims: &Claims,
    status: Option<&str>,
  ) -> Result<Vec<Incident>> {
    guard::authenticate(claims)?;
    let statuses = match status {
      Some(value) => Some(vec![parse_status(value)?]),
      None => None,
    };
    let mut incidents = self.store.list_filtered(statuses).await?;
    if claims.role == Role::Estudiante {
      incidents.retain(|incident| incident.reported_by == claims.subject);
    }
    Ok(incidents)
  }

  /// Staff list view with multi-value filters, priority-weight ordering, and
  /// a per-status summary.
  pub async fn admin_list(
    &self,
    claims: &Claims,
    filter: ListFilter,
  ) -> Result<AdminListing> {
    guard::require_role(claims, &STAFF_ROLES)?;

    let statuses: Option<Vec<Status>> = filter
      .statuses
      .map(|values| values.iter().map(|v| parse_status(v)).collect())
      .transpose()?;
    let urgencies: Option<Vec<Severity>> = filter
      .urgencies
      .map(|values| values.iter().map(|v| parse_severity(v)).collect())
      .transpose()?;
    let priorities: Option<Vec<Severity>> = filter
      .priorities
      .map(|values| values.iter().map(|v| parse_severity(v)).collect())
      .transpose()?;

    let mut incidents = self.store.list_filtered(statuses).await?;
    incidents.retain(|incident| {
      urgencies
        .as_ref()
        .is_none_or(|wanted| wanted.contains(&incident.urgency))
        && priorities
          .as_ref()
          .is_none_or(|wanted| wanted.contains(&incident.priority))
    });
    incidents.sort_by(|a, b| {
      (b.priority.weight(), b.created_at)
        .cmp(&(a.priority.weight(), a.created_at))
    });

    let mut stats = StatusCounts::default();
    for incident in &incidents {
      match incident.status {
        Status::Pendiente => stats.pendiente += 1,
        Status::EnAtencion => stats.en_atencion += 1,
        Status::Resuelto => stats.resuelto += 1,
      }
    }
    Ok(AdminListing { stats, incidents })
  }

  /// The incident's audit trail, sorted by timestamp.
  pub async fn get_history(
    &self,
    claims: &Claims,
    incident_id: Uuid,
  ) -> Result<Vec<HistoryEntry>> {
    guard::authenticate(claims)?;
    let incident = self
      .store
      .get(incident_id)
      .await?
      .ok_or(Error::IncidentNotFound(incident_id))?;
    let mut history = incident.history;
    history.sort_by_key(|entry| entry.timestamp);
    Ok(history)
  }

  /// Directory of assignable staff (role `personal`). Autoridad only.
  pub async fn list_staff(&self, claims: &Claims) -> Result<Vec<StaffMember>> {
    guard::require_role(claims, &[Role::Autoridad])?;
    let users = self.store.list_users_by_role(Role::Personal).await?;
    Ok(users.into_iter().map(StaffMember::from).collect())
  }

  /// Shared fan-out for status and priority changes: all staff plus the
  /// reporter.
  async fn fan_out_update(&self, event: EventType, incident: &Incident) {
    let payload = IncidentPayload { incident };
    self
      .notifier
      .broadcast_to_roles(&STAFF_ROLES, event, &payload)
      .await;
    self
      .notifier
      .notify_user(&incident.reported_by, event, &payload)
      .await;
  }
}
