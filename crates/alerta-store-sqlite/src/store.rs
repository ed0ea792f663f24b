//! [`SqliteStore`] — the SQLite implementation of [`IncidentStore`] and
//! [`UserStore`].
//!
//! Every mutating method encodes its inputs up front, then runs a single
//! closure on the dedicated connection thread. Inside the closure a SQL
//! transaction groups the row mutation with its history append, so either
//! both commit or neither does. Domain failures (`IncidentNotFound`,
//! `DuplicateVote`, ...) are returned as values from the closure; only
//! infrastructure failures surface as `Error::Internal`.

use std::path::Path;

use alerta_core::{
  Error, Result,
  incident::{Comment, HistoryEntry, Incident, IncidentPatch, Status},
  store::{IncidentStore, UserStore},
  user::{Role, User},
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  encode::{
    RawHistoryEntry, RawIncident, RawIncidentBundle, RawUser, encode_comment,
    encode_dt, encode_history, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An Alerta store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path)
      .await
      .map_err(Error::internal)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory()
      .await
      .map_err(Error::internal)?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await
      .map_err(Error::internal)
  }
}

// ─── Row helpers (run on the connection thread) ──────────────────────────────

pub(crate) fn is_constraint_violation(e: &rusqlite::Error) -> bool {
  matches!(
    e,
    rusqlite::Error::SqliteFailure(f, _)
      if f.code == rusqlite::ErrorCode::ConstraintViolation
  )
}

fn incident_exists(
  conn: &rusqlite::Connection,
  id_str: &str,
) -> rusqlite::Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM incidents WHERE incident_id = ?1",
        rusqlite::params![id_str],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

fn insert_history_row(
  conn: &rusqlite::Connection,
  id_str: &str,
  row: &RawHistoryEntry,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO incident_history (
       incident_id, action, actor, actor_role, timestamp,
       new_status, priority, assigned_to, note
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    rusqlite::params![
      id_str,
      row.action,
      row.actor,
      row.actor_role,
      row.timestamp,
      row.new_status,
      row.priority,
      row.assigned_to,
      row.note,
    ],
  )?;
  Ok(())
}

/// Fetch an incident row with all of its child rows in one pass.
fn fetch_bundle(
  conn: &rusqlite::Connection,
  id_str: &str,
) -> rusqlite::Result<Option<RawIncidentBundle>> {
  let incident: Option<RawIncident> = conn
    .query_row(
      "SELECT incident_id, kind, location, description, urgency, priority,
              status, reported_by, reporter_role, assigned_to,
              significance_count, created_at, updated_at, last_note
       FROM incidents WHERE incident_id = ?1",
      rusqlite::params![id_str],
      row_to_raw_incident,
    )
    .optional()?;

  let Some(incident) = incident else {
    return Ok(None);
  };

  let comments = conn
    .prepare(
      "SELECT comment_id, text, actor, actor_role, timestamp
       FROM incident_comments WHERE incident_id = ?1 ORDER BY timestamp",
    )?
    .query_map(rusqlite::params![id_str], |row| {
      Ok(crate::encode::RawComment {
        comment_id: row.get(0)?,
        text:       row.get(1)?,
        actor:      row.get(2)?,
        actor_role: row.get(3)?,
        timestamp:  row.get(4)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  // seq preserves append order; timestamps are nondecreasing along it.
  let history = conn
    .prepare(
      "SELECT action, actor, actor_role, timestamp,
              new_status, priority, assigned_to, note
       FROM incident_history WHERE incident_id = ?1 ORDER BY seq",
    )?
    .query_map(rusqlite::params![id_str], |row| {
      Ok(RawHistoryEntry {
        action:      row.get(0)?,
        actor:       row.get(1)?,
        actor_role:  row.get(2)?,
        timestamp:   row.get(3)?,
        new_status:  row.get(4)?,
        priority:    row.get(5)?,
        assigned_to: row.get(6)?,
        note:        row.get(7)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let voters = conn
    .prepare(
      "SELECT voter FROM significance_votes
       WHERE incident_id = ?1 ORDER BY voter",
    )?
    .query_map(rusqlite::params![id_str], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;

  Ok(Some(RawIncidentBundle { incident, comments, history, voters }))
}

fn row_to_raw_incident(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawIncident> {
  Ok(RawIncident {
    incident_id:        row.get(0)?,
    kind:               row.get(1)?,
    location:           row.get(2)?,
    description:        row.get(3)?,
    urgency:            row.get(4)?,
    priority:           row.get(5)?,
    status:             row.get(6)?,
    reported_by:        row.get(7)?,
    reporter_role:      row.get(8)?,
    assigned_to:        row.get(9)?,
    significance_count: row.get(10)?,
    created_at:         row.get(11)?,
    updated_at:         row.get(12)?,
    last_note:          row.get(13)?,
  })
}

// ─── IncidentStore impl ──────────────────────────────────────────────────────

impl IncidentStore for SqliteStore {
  async fn create(&self, incident: Incident) -> Result<()> {
    let incident_id = incident.incident_id;
    let id_str = encode_uuid(incident_id);
    let kind = incident.kind;
    let location = incident.location;
    let description = incident.description;
    let urgency = incident.urgency.to_string();
    let priority = incident.priority.to_string();
    let status = incident.status.to_string();
    let reported_by = incident.reported_by;
    let reporter_role = incident.reporter_role.to_string();
    let assigned_to = incident.assigned_to;
    let significance_count = incident.significance_count as i64;
    let created_at = encode_dt(incident.created_at);
    let updated_at = encode_dt(incident.updated_at);
    let last_note = incident.last_note;
    let history: Vec<RawHistoryEntry> =
      incident.history.iter().map(encode_history).collect();
    let comments: Vec<crate::encode::RawComment> =
      incident.comments.iter().map(encode_comment).collect();
    let voters: Vec<String> =
      incident.significance_voters.into_iter().collect();
    let voted_at = updated_at.clone();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        match tx.execute(
          "INSERT INTO incidents (
             incident_id, kind, location, description, urgency, priority,
             status, reported_by, reporter_role, assigned_to,
             significance_count, created_at, updated_at, last_note
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
          rusqlite::params![
            id_str,
            kind,
            location,
            description,
            urgency,
            priority,
            status,
            reported_by,
            reporter_role,
            assigned_to,
            significance_count,
            created_at,
            updated_at,
            last_note,
          ],
        ) {
          Ok(_) => {}
          Err(e) if is_constraint_violation(&e) => {
            return Ok(Err(Error::IdCollision(incident_id)));
          }
          Err(e) => return Err(e.into()),
        }

        for row in &history {
          insert_history_row(&tx, &id_str, row)?;
        }
        for c in &comments {
          tx.execute(
            "INSERT INTO incident_comments
               (comment_id, incident_id, text, actor, actor_role, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
              c.comment_id, id_str, c.text, c.actor, c.actor_role, c.timestamp
            ],
          )?;
        }
        for voter in &voters {
          tx.execute(
            "INSERT INTO significance_votes (incident_id, voter, voted_at)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![id_str, voter, voted_at],
          )?;
        }

        tx.commit()?;
        Ok(Ok(()))
      })
      .await
      .map_err(Error::internal)?
  }

  async fn get(&self, incident_id: Uuid) -> Result<Option<Incident>> {
    let id_str = encode_uuid(incident_id);

    let bundle = self
      .conn
      .call(move |conn| Ok(fetch_bundle(conn, &id_str)?))
      .await
      .map_err(Error::internal)?;

    bundle.map(RawIncidentBundle::into_incident).transpose()
  }

  async fn conditional_update(
    &self,
    incident_id: Uuid,
    patch: IncidentPatch,
    entry: HistoryEntry,
  ) -> Result<Incident> {
    let id_str = encode_uuid(incident_id);
    let ts_str = encode_dt(Utc::now());
    let status_str = patch.status.map(|s| s.to_string());
    let priority_str = patch.priority.map(|p| p.to_string());
    let assigned_str = patch.assigned_to;
    let note_str = patch.last_note;
    let entry_row = encode_history(&entry);

    let bundle = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let mut sets: Vec<&'static str> = vec!["updated_at = :ts"];
        let mut params: Vec<(&str, &dyn rusqlite::ToSql)> =
          vec![(":ts", &ts_str), (":id", &id_str)];
        if let Some(v) = &status_str {
          sets.push("status = :status");
          params.push((":status", v));
        }
        if let Some(v) = &priority_str {
          sets.push("priority = :priority");
          params.push((":priority", v));
        }
        if let Some(v) = &assigned_str {
          sets.push("assigned_to = :assigned");
          params.push((":assigned", v));
        }
        if let Some(v) = &note_str {
          sets.push("last_note = :note");
          params.push((":note", v));
        }

        // The WHERE clause is the existence condition: zero affected rows
        // means the incident is absent and nothing was written.
        let sql = format!(
          "UPDATE incidents SET {} WHERE incident_id = :id",
          sets.join(", ")
        );
        let affected = tx.execute(&sql, &params[..])?;
        if affected == 0 {
          return Ok(Err(Error::IncidentNotFound(incident_id)));
        }

        insert_history_row(&tx, &id_str, &entry_row)?;
        let bundle = match fetch_bundle(&tx, &id_str)? {
          Some(b) => b,
          None => return Ok(Err(Error::IncidentNotFound(incident_id))),
        };
        tx.commit()?;
        Ok(Ok(bundle))
      })
      .await
      .map_err(Error::internal)??;

    bundle.into_incident()
  }

  async fn append_comment(
    &self,
    incident_id: Uuid,
    comment: Comment,
    entry: HistoryEntry,
  ) -> Result<Incident> {
    let id_str = encode_uuid(incident_id);
    let ts_str = encode_dt(Utc::now());
    let comment_row = encode_comment(&comment);
    let entry_row = encode_history(&entry);

    let bundle = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if !incident_exists(&tx, &id_str)? {
          return Ok(Err(Error::IncidentNotFound(incident_id)));
        }

        tx.execute(
          "INSERT INTO incident_comments
             (comment_id, incident_id, text, actor, actor_role, timestamp)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            comment_row.comment_id,
            id_str,
            comment_row.text,
            comment_row.actor,
            comment_row.actor_role,
            comment_row.timestamp,
          ],
        )?;
        tx.execute(
          "UPDATE incidents SET updated_at = ?2 WHERE incident_id = ?1",
          rusqlite::params![id_str, ts_str],
        )?;
        insert_history_row(&tx, &id_str, &entry_row)?;

        let bundle = match fetch_bundle(&tx, &id_str)? {
          Some(b) => b,
          None => return Ok(Err(Error::IncidentNotFound(incident_id))),
        };
        tx.commit()?;
        Ok(Ok(bundle))
      })
      .await
      .map_err(Error::internal)??;

    bundle.into_incident()
  }

  async fn add_significance_vote(
    &self,
    incident_id: Uuid,
    voter: String,
    entry: HistoryEntry,
  ) -> Result<Incident> {
    let id_str = encode_uuid(incident_id);
    let ts_str = encode_dt(Utc::now());
    let entry_row = encode_history(&entry);

    let bundle = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        if !incident_exists(&tx, &id_str)? {
          return Ok(Err(Error::IncidentNotFound(incident_id)));
        }

        // The insert itself is the membership condition. Two concurrent
        // votes by the same user serialize on the connection thread and the
        // second hits the UNIQUE constraint with no state change.
        match tx.execute(
          "INSERT INTO significance_votes (incident_id, voter, voted_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, voter, ts_str],
        ) {
          Ok(_) => {}
          Err(e) if is_constraint_violation(&e) => {
            return Ok(Err(Error::DuplicateVote(voter.clone())));
          }
          Err(e) => return Err(e.into()),
        }

        tx.execute(
          "UPDATE incidents
           SET significance_count = significance_count + 1, updated_at = ?2
           WHERE incident_id = ?1",
          rusqlite::params![id_str, ts_str],
        )?;
        insert_history_row(&tx, &id_str, &entry_row)?;

        let bundle = match fetch_bundle(&tx, &id_str)? {
          Some(b) => b,
          None => return Ok(Err(Error::IncidentNotFound(incident_id))),
        };
        tx.commit()?;
        Ok(Ok(bundle))
      })
      .await
      .map_err(Error::internal)??;

    bundle.into_incident()
  }

  async fn list_filtered(
    &self,
    statuses: Option<Vec<Status>>,
  ) -> Result<Vec<Incident>> {
    let status_strs: Option<Vec<String>> = statuses
      .filter(|s| !s.is_empty())
      .map(|s| s.iter().map(|st| st.to_string()).collect());

    let bundles: Vec<RawIncidentBundle> = self
      .conn
      .call(move |conn| {
        let ids: Vec<String> = match &status_strs {
          Some(strs) => {
            let placeholders = (1..=strs.len())
              .map(|i| format!("?{i}"))
              .collect::<Vec<_>>()
              .join(", ");
            let sql = format!(
              "SELECT incident_id FROM incidents WHERE status IN ({placeholders})"
            );
            conn
              .prepare(&sql)?
              .query_map(rusqlite::params_from_iter(strs.iter()), |row| {
                row.get(0)
              })?
              .collect::<rusqlite::Result<Vec<_>>>()?
          }
          None => conn
            .prepare("SELECT incident_id FROM incidents")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };

        let mut bundles = Vec::with_capacity(ids.len());
        for id in &ids {
          if let Some(bundle) = fetch_bundle(conn, id)? {
            bundles.push(bundle);
          }
        }
        Ok(bundles)
      })
      .await
      .map_err(Error::internal)?;

    bundles
      .into_iter()
      .map(RawIncidentBundle::into_incident)
      .collect()
  }
}

// ─── UserStore impl ──────────────────────────────────────────────────────────

impl UserStore for SqliteStore {
  async fn create_user(&self, user: User) -> Result<()> {
    let email = user.email;
    let password_hash = user.password_hash;
    let role = user.role.to_string();
    let full_name = user.full_name;
    let status = user.status;
    let created_at = encode_dt(user.created_at);
    let updated_at = encode_dt(user.updated_at);
    let last_login_at = user.last_login_at.map(encode_dt);

    self
      .conn
      .call(move |conn| {
        match conn.execute(
          "INSERT INTO users (
             email, password_hash, role, full_name, status,
             created_at, updated_at, last_login_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            email,
            password_hash,
            role,
            full_name,
            status,
            created_at,
            updated_at,
            last_login_at,
          ],
        ) {
          Ok(_) => Ok(Ok(())),
          Err(e) if is_constraint_violation(&e) => {
            Ok(Err(Error::UserExists(email.clone())))
          }
          Err(e) => Err(e.into()),
        }
      })
      .await
      .map_err(Error::internal)?
  }

  async fn get_user(&self, email: String) -> Result<Option<User>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT email, password_hash, role, full_name, status,
                      created_at, updated_at, last_login_at
               FROM users WHERE email = ?1",
              rusqlite::params![email],
              row_to_raw_user,
            )
            .optional()?,
        )
      })
      .await
      .map_err(Error::internal)?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn list_users_by_role(&self, role: Role) -> Result<Vec<User>> {
    let role_str = role.to_string();

    let raws: Vec<RawUser> = self
      .conn
      .call(move |conn| {
        let rows = conn
          .prepare(
            "SELECT email, password_hash, role, full_name, status,
                    created_at, updated_at, last_login_at
             FROM users WHERE role = ?1",
          )?
          .query_map(rusqlite::params![role_str], row_to_raw_user)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::internal)?;

    raws.into_iter().map(RawUser::into_user).collect()
  }

  async fn update_last_login(&self, email: String) -> Result<()> {
    let ts_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE users SET last_login_at = ?2, updated_at = ?2
           WHERE email = ?1",
          rusqlite::params![email, ts_str],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::internal)
  }
}

fn row_to_raw_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
  Ok(RawUser {
    email:         row.get(0)?,
    password_hash: row.get(1)?,
    role:          row.get(2)?,
    full_name:     row.get(3)?,
    status:        row.get(4)?,
    created_at:    row.get(5)?,
    updated_at:    row.get(6)?,
    last_login_at: row.get(7)?,
  })
}
