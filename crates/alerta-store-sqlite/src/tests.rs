//! Integration tests for `SqliteStore` against an in-memory database.

use std::{collections::BTreeSet, time::Duration};

use alerta_core::{
  Error,
  incident::{
    Comment, HistoryAction, HistoryEntry, Incident, IncidentPatch, Severity,
    Status,
  },
  store::{ConnectionRegistry, IncidentStore, UserStore},
  user::{Role, User},
};
use chrono::Utc;
use uuid::Uuid;

use crate::SqliteStore;

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn created_entry(by: &str, role: Role) -> HistoryEntry {
  HistoryEntry::new(HistoryAction::Created, by.to_string(), role)
}

fn water_leak(reported_by: &str) -> Incident {
  let now = Utc::now();
  Incident {
    incident_id: Uuid::new_v4(),
    kind: "Fuga de agua".to_string(),
    location: "Lab C".to_string(),
    description: "Fuga en el techo del laboratorio".to_string(),
    urgency: Severity::Alta,
    priority: Severity::Alta,
    status: Status::Pendiente,
    reported_by: reported_by.to_string(),
    reporter_role: Role::Estudiante,
    assigned_to: None,
    comments: Vec::new(),
    significance_voters: BTreeSet::new(),
    significance_count: 0,
    history: vec![created_entry(reported_by, Role::Estudiante)],
    created_at: now,
    updated_at: now,
    last_note: None,
  }
}

// ─── Create / get ────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_roundtrip() {
  let s = store().await;
  let incident = water_leak("u1@utec.edu.pe");
  let id = incident.incident_id;

  s.create(incident).await.unwrap();

  let fetched = s.get(id).await.unwrap().expect("incident present");
  assert_eq!(fetched.incident_id, id);
  assert_eq!(fetched.kind, "Fuga de agua");
  assert_eq!(fetched.status, Status::Pendiente);
  assert_eq!(fetched.priority, Severity::Alta);
  assert_eq!(fetched.history.len(), 1);
  assert_eq!(fetched.history[0].action, HistoryAction::Created);
  assert_eq!(fetched.significance_count, 0);
}

#[tokio::test]
async fn get_missing_returns_none() {
  let s = store().await;
  assert!(s.get(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn create_rejects_id_collision() {
  let s = store().await;
  let first = water_leak("u1@utec.edu.pe");
  let mut second = water_leak("u2@utec.edu.pe");
  second.incident_id = first.incident_id;

  s.create(first).await.unwrap();
  let err = s.create(second).await.unwrap_err();
  assert!(matches!(err, Error::IdCollision(_)));
}

// ─── Conditional update ──────────────────────────────────────────────────────

#[tokio::test]
async fn conditional_update_applies_patch_and_appends_history() {
  let s = store().await;
  let incident = water_leak("u1@utec.edu.pe");
  let id = incident.incident_id;
  s.create(incident).await.unwrap();

  let mut entry = HistoryEntry::new(
    HistoryAction::StatusChange,
    "staff@utec.edu.pe".to_string(),
    Role::Personal,
  );
  entry.new_status = Some(Status::EnAtencion);

  let updated = s
    .conditional_update(
      id,
      IncidentPatch { status: Some(Status::EnAtencion), ..Default::default() },
      entry,
    )
    .await
    .unwrap();

  assert_eq!(updated.status, Status::EnAtencion);
  // Untouched attributes survive.
  assert_eq!(updated.priority, Severity::Alta);
  assert_eq!(updated.history.len(), 2);
  assert_eq!(updated.history[1].action, HistoryAction::StatusChange);
  assert_eq!(updated.history[1].new_status, Some(Status::EnAtencion));
}

#[tokio::test]
async fn conditional_update_missing_incident_errors() {
  let s = store().await;
  let err = s
    .conditional_update(
      Uuid::new_v4(),
      IncidentPatch { status: Some(Status::Resuelto), ..Default::default() },
      HistoryEntry::new(
        HistoryAction::StatusChange,
        "staff@utec.edu.pe".to_string(),
        Role::Personal,
      ),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::IncidentNotFound(_)));
}

#[tokio::test]
async fn updated_at_never_decreases() {
  let s = store().await;
  let incident = water_leak("u1@utec.edu.pe");
  let id = incident.incident_id;
  s.create(incident).await.unwrap();

  let mut previous = s.get(id).await.unwrap().unwrap().updated_at;
  for status in [Status::EnAtencion, Status::Resuelto, Status::Pendiente] {
    let mut entry = HistoryEntry::new(
      HistoryAction::StatusChange,
      "staff@utec.edu.pe".to_string(),
      Role::Personal,
    );
    entry.new_status = Some(status);
    let updated = s
      .conditional_update(
        id,
        IncidentPatch { status: Some(status), ..Default::default() },
        entry,
      )
      .await
      .unwrap();
    assert!(updated.updated_at >= previous);
    previous = updated.updated_at;
  }
}

#[tokio::test]
async fn history_length_matches_mutation_count_and_is_sorted() {
  let s = store().await;
  let incident = water_leak("u1@utec.edu.pe");
  let id = incident.incident_id;
  s.create(incident).await.unwrap();

  let mut entry = HistoryEntry::new(
    HistoryAction::PriorityChange,
    "auth@utec.edu.pe".to_string(),
    Role::Autoridad,
  );
  entry.priority = Some(Severity::Critica);
  s.conditional_update(
    id,
    IncidentPatch { priority: Some(Severity::Critica), ..Default::default() },
    entry,
  )
  .await
  .unwrap();

  s.add_significance_vote(
    id,
    "u2@utec.edu.pe".to_string(),
    HistoryEntry::new(
      HistoryAction::SignificanceUpvote,
      "u2@utec.edu.pe".to_string(),
      Role::Estudiante,
    ),
  )
  .await
  .unwrap();

  let fetched = s.get(id).await.unwrap().unwrap();
  // CREATED + PRIORITY_CHANGE + SIGNIFICANCE_UPVOTE
  assert_eq!(fetched.history.len(), 3);
  assert!(
    fetched
      .history
      .windows(2)
      .all(|w| w[0].timestamp <= w[1].timestamp)
  );
}

// ─── Comments ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn append_comment_adds_comment_and_history() {
  let s = store().await;
  let incident = water_leak("u1@utec.edu.pe");
  let id = incident.incident_id;
  s.create(incident).await.unwrap();

  let comment = Comment {
    comment_id: Uuid::new_v4(),
    text:       "Sigue goteando".to_string(),
    by:         "u1@utec.edu.pe".to_string(),
    role:       Role::Estudiante,
    timestamp:  Utc::now(),
  };
  let mut entry = HistoryEntry::new(
    HistoryAction::Comment,
    "u1@utec.edu.pe".to_string(),
    Role::Estudiante,
  );
  entry.note = Some("Sigue goteando".to_string());

  let updated = s.append_comment(id, comment.clone(), entry).await.unwrap();
  assert_eq!(updated.comments.len(), 1);
  assert_eq!(updated.comments[0].comment_id, comment.comment_id);
  assert_eq!(updated.comments[0].text, "Sigue goteando");
  assert_eq!(updated.history.len(), 2);
}

#[tokio::test]
async fn append_comment_missing_incident_errors() {
  let s = store().await;
  let err = s
    .append_comment(
      Uuid::new_v4(),
      Comment {
        comment_id: Uuid::new_v4(),
        text:       "hola".to_string(),
        by:         "u1@utec.edu.pe".to_string(),
        role:       Role::Estudiante,
        timestamp:  Utc::now(),
      },
      HistoryEntry::new(
        HistoryAction::Comment,
        "u1@utec.edu.pe".to_string(),
        Role::Estudiante,
      ),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::IncidentNotFound(_)));
}

// ─── Significance votes ──────────────────────────────────────────────────────

fn vote_entry(voter: &str) -> HistoryEntry {
  HistoryEntry::new(
    HistoryAction::SignificanceUpvote,
    voter.to_string(),
    Role::Estudiante,
  )
}

#[tokio::test]
async fn vote_inserts_voter_and_increments_count() {
  let s = store().await;
  let incident = water_leak("u1@utec.edu.pe");
  let id = incident.incident_id;
  s.create(incident).await.unwrap();

  let updated = s
    .add_significance_vote(id, "u2@utec.edu.pe".to_string(), vote_entry("u2@utec.edu.pe"))
    .await
    .unwrap();

  assert_eq!(updated.significance_count, 1);
  assert!(updated.significance_voters.contains("u2@utec.edu.pe"));
  assert_eq!(
    updated.significance_count,
    updated.significance_voters.len() as u64
  );
}

#[tokio::test]
async fn duplicate_vote_conflicts_without_state_change() {
  let s = store().await;
  let incident = water_leak("u1@utec.edu.pe");
  let id = incident.incident_id;
  s.create(incident).await.unwrap();

  s.add_significance_vote(id, "u2@utec.edu.pe".to_string(), vote_entry("u2@utec.edu.pe"))
    .await
    .unwrap();
  let err = s
    .add_significance_vote(id, "u2@utec.edu.pe".to_string(), vote_entry("u2@utec.edu.pe"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::DuplicateVote(_)));

  let fetched = s.get(id).await.unwrap().unwrap();
  assert_eq!(fetched.significance_count, 1);
  // The failed vote appended no history entry.
  assert_eq!(fetched.history.len(), 2);
}

#[tokio::test]
async fn concurrent_votes_by_same_user_yield_one_success() {
  let s = store().await;
  let incident = water_leak("u1@utec.edu.pe");
  let id = incident.incident_id;
  s.create(incident).await.unwrap();

  let a = s.add_significance_vote(
    id,
    "u2@utec.edu.pe".to_string(),
    vote_entry("u2@utec.edu.pe"),
  );
  let b = s.add_significance_vote(
    id,
    "u2@utec.edu.pe".to_string(),
    vote_entry("u2@utec.edu.pe"),
  );
  let (ra, rb) = tokio::join!(a, b);

  let successes = [&ra, &rb].iter().filter(|r| r.is_ok()).count();
  assert_eq!(successes, 1);
  assert!(
    [ra, rb]
      .into_iter()
      .filter_map(|r| r.err())
      .all(|e| matches!(e, Error::DuplicateVote(_)))
  );

  let fetched = s.get(id).await.unwrap().unwrap();
  assert_eq!(fetched.significance_count, 1);
}

#[tokio::test]
async fn votes_by_distinct_users_accumulate() {
  let s = store().await;
  let incident = water_leak("u1@utec.edu.pe");
  let id = incident.incident_id;
  s.create(incident).await.unwrap();

  for voter in ["a@utec.edu.pe", "b@utec.edu.pe", "c@utec.edu.pe"] {
    s.add_significance_vote(id, voter.to_string(), vote_entry(voter))
      .await
      .unwrap();
  }

  let fetched = s.get(id).await.unwrap().unwrap();
  assert_eq!(fetched.significance_count, 3);
  assert_eq!(fetched.significance_voters.len(), 3);
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_filtered_by_status() {
  let s = store().await;
  let open = water_leak("u1@utec.edu.pe");
  let open_id = open.incident_id;
  s.create(open).await.unwrap();

  let mut resolved = water_leak("u2@utec.edu.pe");
  resolved.status = Status::Resuelto;
  s.create(resolved).await.unwrap();

  let pending = s
    .list_filtered(Some(vec![Status::Pendiente]))
    .await
    .unwrap();
  assert_eq!(pending.len(), 1);
  assert_eq!(pending[0].incident_id, open_id);

  let all = s.list_filtered(None).await.unwrap();
  assert_eq!(all.len(), 2);
}

// ─── Users ───────────────────────────────────────────────────────────────────

fn user(email: &str, role: Role) -> User {
  User::new(
    email.to_string(),
    "$argon2id$v=19$fake".to_string(),
    role,
    "Test User".to_string(),
  )
}

#[tokio::test]
async fn create_and_get_user() {
  let s = store().await;
  s.create_user(user("ana@utec.edu.pe", Role::Estudiante))
    .await
    .unwrap();

  let fetched = s
    .get_user("ana@utec.edu.pe".to_string())
    .await
    .unwrap()
    .expect("user present");
  assert_eq!(fetched.role, Role::Estudiante);
  assert_eq!(fetched.status, "active");
  assert!(fetched.last_login_at.is_none());
}

#[tokio::test]
async fn duplicate_user_conflicts() {
  let s = store().await;
  s.create_user(user("ana@utec.edu.pe", Role::Estudiante))
    .await
    .unwrap();
  let err = s
    .create_user(user("ana@utec.edu.pe", Role::Personal))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::UserExists(_)));
}

#[tokio::test]
async fn list_users_by_role() {
  let s = store().await;
  s.create_user(user("ana@utec.edu.pe", Role::Estudiante))
    .await
    .unwrap();
  s.create_user(user("staff1@utec.edu.pe", Role::Personal))
    .await
    .unwrap();
  s.create_user(user("staff2@utec.edu.pe", Role::Personal))
    .await
    .unwrap();

  let staff = s.list_users_by_role(Role::Personal).await.unwrap();
  assert_eq!(staff.len(), 2);
  assert!(staff.iter().all(|u| u.role == Role::Personal));
}

#[tokio::test]
async fn update_last_login_stamps_timestamp() {
  let s = store().await;
  s.create_user(user("ana@utec.edu.pe", Role::Estudiante))
    .await
    .unwrap();

  s.update_last_login("ana@utec.edu.pe".to_string())
    .await
    .unwrap();

  let fetched = s
    .get_user("ana@utec.edu.pe".to_string())
    .await
    .unwrap()
    .unwrap();
  assert!(fetched.last_login_at.is_some());
}

// ─── Connection registry ─────────────────────────────────────────────────────

const TTL: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn save_and_query_connections() {
  let s = store().await;
  s.save("c1".to_string(), "ana@utec.edu.pe".to_string(), Role::Estudiante, TTL)
    .await
    .unwrap();
  s.save("c2".to_string(), "staff@utec.edu.pe".to_string(), Role::Personal, TTL)
    .await
    .unwrap();
  s.save("c3".to_string(), "auth@utec.edu.pe".to_string(), Role::Autoridad, TTL)
    .await
    .unwrap();

  let staffish = s
    .query_by_roles(vec![Role::Personal, Role::Autoridad])
    .await
    .unwrap();
  assert_eq!(staffish.len(), 2);

  let anas = s
    .query_by_user("ana@utec.edu.pe".to_string())
    .await
    .unwrap();
  assert_eq!(anas.len(), 1);
  assert_eq!(anas[0].connection_id, "c1");
}

#[tokio::test]
async fn expired_connections_are_invisible() {
  let s = store().await;
  s.save(
    "c1".to_string(),
    "ana@utec.edu.pe".to_string(),
    Role::Estudiante,
    Duration::ZERO,
  )
  .await
  .unwrap();

  let found = s
    .query_by_user("ana@utec.edu.pe".to_string())
    .await
    .unwrap();
  assert!(found.is_empty());
}

#[tokio::test]
async fn touch_refreshes_expiry() {
  let s = store().await;
  s.save(
    "c1".to_string(),
    "ana@utec.edu.pe".to_string(),
    Role::Estudiante,
    Duration::ZERO,
  )
  .await
  .unwrap();

  s.touch("c1".to_string(), TTL).await.unwrap();

  let found = s
    .query_by_user("ana@utec.edu.pe".to_string())
    .await
    .unwrap();
  assert_eq!(found.len(), 1);
  assert!(found[0].expires_at > found[0].connected_at);
}

#[tokio::test]
async fn delete_is_idempotent() {
  let s = store().await;
  s.save("c1".to_string(), "ana@utec.edu.pe".to_string(), Role::Estudiante, TTL)
    .await
    .unwrap();

  s.delete("c1".to_string()).await.unwrap();
  s.delete("c1".to_string()).await.unwrap();

  let found = s
    .query_by_user("ana@utec.edu.pe".to_string())
    .await
    .unwrap();
  assert!(found.is_empty());
}

#[tokio::test]
async fn query_by_roles_with_no_roles_is_empty() {
  let s = store().await;
  s.save("c1".to_string(), "ana@utec.edu.pe".to_string(), Role::Estudiante, TTL)
    .await
    .unwrap();
  let found = s.query_by_roles(vec![]).await.unwrap();
  assert!(found.is_empty());
}
