//! Storage trait definitions.
//!
//! Implemented by storage backends (e.g. `alerta-store-sqlite`). Higher
//! layers (`alerta-engine`, `alerta-server`) depend on these abstractions,
//! not on any concrete backend.
//!
//! Every mutation is a single atomic compare-and-apply conditioned on the
//! record's current existence (and, for votes, on the voter's non-membership).
//! There is no read-modify-write window; two concurrent mutations touching
//! disjoint attribute sets may both succeed and interleave, each appending
//! its own history entry.
//!
//! All methods return `Send` futures so the traits can be used in
//! multi-threaded async runtimes (e.g. tokio with `axum`). Methods return the
//! shared [`crate::Error`] taxonomy so callers can classify `NotFound` and
//! conflict outcomes without knowing the backend.

use std::{future::Future, time::Duration};

use uuid::Uuid;

use crate::{
  Result,
  connection::Connection,
  incident::{Comment, HistoryEntry, Incident, IncidentPatch, Status},
  user::{Role, User},
};

// ─── Incident store ──────────────────────────────────────────────────────────

/// Durable, keyed-by-incident-id storage with atomic conditional mutation,
/// append-only history, and set-based vote bookkeeping.
pub trait IncidentStore: Send + Sync {
  /// Persist a brand-new incident, including its initial history.
  ///
  /// Fails with [`crate::Error::IdCollision`] if the id is already present —
  /// a blind overwrite is never allowed.
  fn create(
    &self,
    incident: Incident,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Retrieve an incident by id. Returns `None` if not found.
  fn get(
    &self,
    incident_id: Uuid,
  ) -> impl Future<Output = Result<Option<Incident>>> + Send + '_;

  /// Atomically verify the incident exists, apply every present field of
  /// `patch`, set `updated_at`, and append exactly one history entry.
  ///
  /// Fails with [`crate::Error::IncidentNotFound`] if the record is absent;
  /// no partial state change accompanies the error.
  fn conditional_update(
    &self,
    incident_id: Uuid,
    patch: IncidentPatch,
    entry: HistoryEntry,
  ) -> impl Future<Output = Result<Incident>> + Send + '_;

  /// Atomically append to `comments` and to `history`; same existence
  /// guarantee as [`Self::conditional_update`].
  fn append_comment(
    &self,
    incident_id: Uuid,
    comment: Comment,
    entry: HistoryEntry,
  ) -> impl Future<Output = Result<Incident>> + Send + '_;

  /// Atomically insert `voter` into the significance set **only if absent**,
  /// increment the count by exactly one, and append the history entry.
  ///
  /// The write itself is conditioned on non-membership: a duplicate vote
  /// fails with [`crate::Error::DuplicateVote`] with no state change, even
  /// under concurrent submission.
  fn add_significance_vote(
    &self,
    incident_id: Uuid,
    voter: String,
    entry: HistoryEntry,
  ) -> impl Future<Output = Result<Incident>> + Send + '_;

  /// Full or status-partitioned scan. No ordering guarantee; callers sort.
  fn list_filtered(
    &self,
    statuses: Option<Vec<Status>>,
  ) -> impl Future<Output = Result<Vec<Incident>>> + Send + '_;
}

// ─── User store ──────────────────────────────────────────────────────────────

/// Storage for user records, keyed by email.
pub trait UserStore: Send + Sync {
  /// Persist a new user. Fails with [`crate::Error::UserExists`] if the
  /// email is already registered.
  fn create_user(
    &self,
    user: User,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Retrieve a user by email. Returns `None` if not found.
  fn get_user(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<User>>> + Send + '_;

  /// All users holding `role`.
  fn list_users_by_role(
    &self,
    role: Role,
  ) -> impl Future<Output = Result<Vec<User>>> + Send + '_;

  /// Stamp `last_login_at` with the current time.
  fn update_last_login(
    &self,
    email: String,
  ) -> impl Future<Output = Result<()>> + Send + '_;
}

// ─── Connection registry ─────────────────────────────────────────────────────

/// Durable registry of live realtime subscriptions with TTL-based expiry and
/// secondary lookup by role and by user.
///
/// Expiry is dual: queries lazily skip rows past `expires_at`, and the
/// fan-out layer actively deletes a connection the instant a delivery
/// attempt reports the endpoint gone.
pub trait ConnectionRegistry: Send + Sync {
  /// Upsert a connection with `expires_at = now + ttl`.
  fn save(
    &self,
    connection_id: String,
    user: String,
    role: Role,
    ttl: Duration,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Refresh `last_ping_at` and `expires_at`. A no-op for unknown ids.
  fn touch(
    &self,
    connection_id: String,
    ttl: Duration,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Idempotent removal.
  fn delete(
    &self,
    connection_id: String,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// All unexpired connections whose role is in `roles`.
  fn query_by_roles(
    &self,
    roles: Vec<Role>,
  ) -> impl Future<Output = Result<Vec<Connection>>> + Send + '_;

  /// All unexpired connections for one user identity.
  fn query_by_user(
    &self,
    user: String,
  ) -> impl Future<Output = Result<Vec<Connection>>> + Send + '_;
}
