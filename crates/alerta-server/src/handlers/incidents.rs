//! Incident endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/incidents` | Any authenticated role |
//! | `GET`  | `/incidents` | Optional `?status=`; estudiante sees own only |
//! | `GET`  | `/incidents/admin` | Staff view, comma-separated filters |
//! | `PUT`  | `/incidents/{id}/status` | personal, autoridad |
//! | `PUT`  | `/incidents/{id}/priority` | autoridad |
//! | `PUT`  | `/incidents/{id}/assign` | autoridad |
//! | `POST` | `/incidents/{id}/comments` | estudiante |
//! | `POST` | `/incidents/{id}/significance` | any role, once |
//! | `GET`  | `/incidents/{id}/history` | any role |
//! | `GET`  | `/staff` | autoridad |

use alerta_engine::{ListFilter, NewIncidentInput};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::{AppState, Store, auth::Auth, error::ApiError};

// ─── Create and list ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  #[serde(rename = "type")]
  pub kind:        String,
  pub location:    String,
  pub description: String,
  pub urgency:     String,
  pub note:        Option<String>,
}

/// `POST /incidents`
pub async fn create<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let incident = state
    .engine
    .create_incident(&claims, NewIncidentInput {
      kind:        body.kind,
      location:    body.location,
      description: body.description,
      urgency:     body.urgency,
      note:        body.note,
    })
    .await?;
  Ok((
    StatusCode::CREATED,
    Json(json!({ "message": "Incidente registrado", "incident": incident })),
  ))
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub status: Option<String>,
}

/// `GET /incidents[?status=<status>]`
pub async fn list<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
  Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
  let incidents =
    state.engine.list_incidents(&claims, params.status.as_deref()).await?;
  Ok(Json(json!({ "incidents": incidents })))
}

#[derive(Debug, Deserialize)]
pub struct AdminParams {
  pub status:   Option<String>,
  pub urgency:  Option<String>,
  pub priority: Option<String>,
}

/// `GET /incidents/admin` — comma-separated multi-value filters.
pub async fn admin_list<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
  Query(params): Query<AdminParams>,
) -> Result<impl IntoResponse, ApiError> {
  let filter = ListFilter {
    statuses:   split_param(params.status),
    urgencies:  split_param(params.urgency),
    priorities: split_param(params.priority),
  };
  let listing = state.engine.admin_list(&claims, filter).await?;
  Ok(Json(
    json!({ "stats": listing.stats, "incidents": listing.incidents }),
  ))
}

fn split_param(value: Option<String>) -> Option<Vec<String>> {
  let entries: Vec<String> = value?
    .split(',')
    .map(str::trim)
    .filter(|entry| !entry.is_empty())
    .map(String::from)
    .collect();
  if entries.is_empty() { None } else { Some(entries) }
}

// ─── Mutations ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: String,
  pub note:   Option<String>,
}

/// `PUT /incidents/{id}/status`
pub async fn change_status<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
  Path(incident_id): Path<Uuid>,
  Json(body): Json<StatusBody>,
) -> Result<impl IntoResponse, ApiError> {
  let incident = state
    .engine
    .change_status(&claims, incident_id, &body.status, body.note)
    .await?;
  Ok(Json(json!({ "message": "Incidente actualizado", "incident": incident })))
}

#[derive(Debug, Deserialize)]
pub struct PriorityBody {
  pub priority: String,
  pub note:     Option<String>,
}

/// `PUT /incidents/{id}/priority`
pub async fn set_priority<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
  Path(incident_id): Path<Uuid>,
  Json(body): Json<PriorityBody>,
) -> Result<impl IntoResponse, ApiError> {
  let incident = state
    .engine
    .set_priority(&claims, incident_id, &body.priority, body.note)
    .await?;
  Ok(Json(
    json!({ "message": "Prioridad actualizada", "incident": incident }),
  ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
  pub assigned_to: String,
}

/// `PUT /incidents/{id}/assign`
pub async fn assign<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
  Path(incident_id): Path<Uuid>,
  Json(body): Json<AssignBody>,
) -> Result<impl IntoResponse, ApiError> {
  let incident =
    state.engine.assign_to(&claims, incident_id, &body.assigned_to).await?;
  Ok(Json(json!({
    "message": "Incidente asignado correctamente",
    "incident": incident,
  })))
}

#[derive(Debug, Deserialize)]
pub struct CommentBody {
  pub text: String,
}

/// `POST /incidents/{id}/comments`
pub async fn comment<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
  Path(incident_id): Path<Uuid>,
  Json(body): Json<CommentBody>,
) -> Result<impl IntoResponse, ApiError> {
  let (incident, comment) =
    state.engine.add_comment(&claims, incident_id, &body.text).await?;
  Ok((
    StatusCode::CREATED,
    Json(json!({
      "message": "Comentario agregado",
      "comment": comment,
      "incident": {
        "incidentId": incident.incident_id,
        "comments": incident.comments,
      },
    })),
  ))
}

/// `POST /incidents/{id}/significance`
pub async fn significance<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
  Path(incident_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let incident =
    state.engine.vote_significance(&claims, incident_id).await?;
  Ok(Json(json!({
    "message": "Significancia registrada",
    "significanceCount": incident.significance_count,
  })))
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// `GET /incidents/{id}/history`
pub async fn history<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
  Path(incident_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
  let history = state.engine.get_history(&claims, incident_id).await?;
  Ok(Json(json!({ "incidentId": incident_id, "history": history })))
}

/// `GET /staff`
pub async fn staff<S: Store>(
  State(state): State<AppState<S>>,
  Auth(claims): Auth,
) -> Result<impl IntoResponse, ApiError> {
  let staff = state.engine.list_staff(&claims).await?;
  let count = staff.len();
  Ok(Json(json!({ "staff": staff, "count": count })))
}
