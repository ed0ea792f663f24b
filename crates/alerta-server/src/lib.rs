//! HTTP and WebSocket transport for the incident engine.
//!
//! Exposes an axum [`Router`] with JSON REST routes for every engine
//! operation, registration/login, and a `/ws` subscription endpoint backed
//! by the connection registry. Works against any store implementing the
//! three storage traits.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod ws;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use alerta_core::store::{ConnectionRegistry, IncidentStore, UserStore};
use alerta_engine::{LifecycleEngine, Notifier};
use axum::{
  Router,
  routing::{get, post, put},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::TokenSigner;
use ws::WsSink;

/// Everything the server needs from a storage backend.
pub trait Store:
  IncidentStore + UserStore + ConnectionRegistry + Clone + Send + Sync + 'static
{
}

impl<T> Store for T where
  T: IncidentStore
    + UserStore
    + ConnectionRegistry
    + Clone
    + Send
    + Sync
    + 'static
{
}

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `ALERTA_`-prefixed environment overrides.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  /// HMAC secret for session tokens.
  pub auth_secret: String,
  #[serde(default = "default_token_ttl")]
  pub token_ttl_seconds: i64,
  #[serde(default = "default_connection_ttl")]
  pub connection_ttl_seconds: u64,
}

fn default_token_ttl() -> i64 {
  3600
}

fn default_connection_ttl() -> u64 {
  3600
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S> {
  pub engine: LifecycleEngine<S, S, WsSink>,
  pub store:  Arc<S>,
  pub sink:   Arc<WsSink>,
  pub tokens: Arc<TokenSigner>,
  pub config: Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      engine: self.engine.clone(),
      store:  Arc::clone(&self.store),
      sink:   Arc::clone(&self.sink),
      tokens: Arc::clone(&self.tokens),
      config: Arc::clone(&self.config),
    }
  }
}

impl<S: Store> AppState<S> {
  /// Wire the sink, notifier, and engine around one store handle.
  pub fn new(store: Arc<S>, config: ServerConfig) -> Self {
    let sink = Arc::new(WsSink::default());
    let notifier = Notifier::new(Arc::clone(&store), Arc::clone(&sink));
    let engine = LifecycleEngine::new(Arc::clone(&store), notifier);
    let tokens = Arc::new(TokenSigner::new(
      &config.auth_secret,
      config.token_ttl_seconds,
    ));
    Self { engine, store, sink, tokens, config: Arc::new(config) }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application router.
pub fn router<S: Store>(state: AppState<S>) -> Router {
  Router::new()
    .route("/auth/register", post(handlers::auth::register::<S>))
    .route("/auth/login",    post(handlers::auth::login::<S>))
    .route(
      "/incidents",
      get(handlers::incidents::list::<S>)
        .post(handlers::incidents::create::<S>),
    )
    .route("/incidents/admin", get(handlers::incidents::admin_list::<S>))
    .route(
      "/incidents/{incident_id}/status",
      put(handlers::incidents::change_status::<S>),
    )
    .route(
      "/incidents/{incident_id}/priority",
      put(handlers::incidents::set_priority::<S>),
    )
    .route(
      "/incidents/{incident_id}/assign",
      put(handlers::incidents::assign::<S>),
    )
    .route(
      "/incidents/{incident_id}/comments",
      post(handlers::incidents::comment::<S>),
    )
    .route(
      "/incidents/{incident_id}/significance",
      post(handlers::incidents::significance::<S>),
    )
    .route(
      "/incidents/{incident_id}/history",
      get(handlers::incidents::history::<S>),
    )
    .route("/staff", get(handlers::incidents::staff::<S>))
    .route("/ws", get(ws::upgrade::<S>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use alerta_store_sqlite::SqliteStore;
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use serde_json::{Value, json};
  use tower::ServiceExt as _;

  async fn make_state() -> AppState<SqliteStore> {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    AppState::new(store, ServerConfig {
      host:                   "127.0.0.1".to_string(),
      port:                   8080,
      store_path:             PathBuf::from(":memory:"),
      auth_secret:            "secreto-de-prueba".to_string(),
      token_ttl_seconds:      3600,
      connection_ttl_seconds: 3600,
    })
  }

  async fn request(
    state: AppState<SqliteStore>,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
  ) -> axum::response::Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
      builder =
        builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
      Some(value) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(value.to_string())
      }
      None => Body::empty(),
    };
    router(state).oneshot(builder.body(body).unwrap()).await.unwrap()
  }

  async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  /// Register a user and return a fresh bearer token.
  async fn signup(
    state: &AppState<SqliteStore>,
    email: &str,
    role: &str,
  ) -> String {
    let response = request(
      state.clone(),
      "POST",
      "/auth/register",
      None,
      Some(json!({
        "email": email,
        "password": "contraseña123",
        "role": role,
        "fullName": "Usuario de Prueba",
      })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = request(
      state.clone(),
      "POST",
      "/auth/login",
      None,
      Some(json!({ "email": email, "password": "contraseña123" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await["token"].as_str().unwrap().to_string()
  }

  async fn create_incident(
    state: &AppState<SqliteStore>,
    token: &str,
  ) -> String {
    let response = request(
      state.clone(),
      "POST",
      "/incidents",
      Some(token),
      Some(json!({
        "type": "Fuga de agua",
        "location": "Lab C",
        "description": "Fuga constante bajo el lavadero",
        "urgency": "alta",
      })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["incident"]["incidentId"]
      .as_str()
      .unwrap()
      .to_string()
  }

  // ── Auth ─────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn register_rejects_bad_input() {
    let state = make_state().await;

    let response = request(
      state.clone(),
      "POST",
      "/auth/register",
      None,
      Some(json!({
        "email": "u1@gmail.com",
        "password": "contraseña123",
        "role": "estudiante",
      })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = request(
      state.clone(),
      "POST",
      "/auth/register",
      None,
      Some(json!({
        "email": "u1@utec.edu.pe",
        "password": "corta",
        "role": "estudiante",
      })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = request(
      state,
      "POST",
      "/auth/register",
      None,
      Some(json!({
        "email": "u1@utec.edu.pe",
        "password": "contraseña123",
        "role": "profesor",
      })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn duplicate_registration_conflicts() {
    let state = make_state().await;
    signup(&state, "u1@utec.edu.pe", "estudiante").await;

    let response = request(
      state,
      "POST",
      "/auth/register",
      None,
      Some(json!({
        "email": "u1@utec.edu.pe",
        "password": "contraseña123",
        "role": "estudiante",
      })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
  }

  #[tokio::test]
  async fn login_with_wrong_password_is_401() {
    let state = make_state().await;
    signup(&state, "u1@utec.edu.pe", "estudiante").await;

    let response = request(
      state,
      "POST",
      "/auth/login",
      None,
      Some(json!({ "email": "u1@utec.edu.pe", "password": "incorrecta" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  #[tokio::test]
  async fn role_synonyms_are_accepted_at_registration() {
    let state = make_state().await;
    let response = request(
      state,
      "POST",
      "/auth/register",
      None,
      Some(json!({
        "email": "u1@utec.edu.pe",
        "password": "contraseña123",
        "role": "student",
      })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await["user"]["role"], "estudiante");
  }

  #[tokio::test]
  async fn requests_without_token_are_401() {
    let state = make_state().await;
    let response =
      request(state, "GET", "/incidents", None, None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
  }

  // ── Lifecycle over HTTP ──────────────────────────────────────────────────────

  #[tokio::test]
  async fn full_incident_lifecycle() {
    let state = make_state().await;
    let student = signup(&state, "u1@utec.edu.pe", "estudiante").await;
    let staff = signup(&state, "p1@utec.edu.pe", "personal").await;
    let authority = signup(&state, "a1@utec.edu.pe", "autoridad").await;

    let id = create_incident(&state, &student).await;

    // Status changes are staff-only.
    let response = request(
      state.clone(),
      "PUT",
      &format!("/incidents/{id}/status"),
      Some(&student),
      Some(json!({ "status": "en_atencion" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = request(
      state.clone(),
      "PUT",
      &format!("/incidents/{id}/status"),
      Some(&staff),
      Some(json!({ "status": "en_atencion", "note": "en camino" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["incident"]["status"], "en_atencion");
    assert_eq!(body["incident"]["lastNote"], "en camino");

    // Priority is autoridad-only.
    let response = request(
      state.clone(),
      "PUT",
      &format!("/incidents/{id}/priority"),
      Some(&staff),
      Some(json!({ "priority": "critica" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = request(
      state.clone(),
      "PUT",
      &format!("/incidents/{id}/priority"),
      Some(&authority),
      Some(json!({ "priority": "critica" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Assignment targets must hold role personal.
    let response = request(
      state.clone(),
      "PUT",
      &format!("/incidents/{id}/assign"),
      Some(&authority),
      Some(json!({ "assignedTo": "u1@utec.edu.pe" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = request(
      state.clone(),
      "PUT",
      &format!("/incidents/{id}/assign"),
      Some(&authority),
      Some(json!({ "assignedTo": "p1@utec.edu.pe" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["incident"]["assignedTo"], "p1@utec.edu.pe");

    // Comments are estudiante-only.
    let response = request(
      state.clone(),
      "POST",
      &format!("/incidents/{id}/comments"),
      Some(&staff),
      Some(json!({ "text": "tomado" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = request(
      state.clone(),
      "POST",
      &format!("/incidents/{id}/comments"),
      Some(&student),
      Some(json!({ "text": "sigue goteando" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // One significance vote per user.
    let response = request(
      state.clone(),
      "POST",
      &format!("/incidents/{id}/significance"),
      Some(&staff),
      None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["significanceCount"], 1);

    let response = request(
      state.clone(),
      "POST",
      &format!("/incidents/{id}/significance"),
      Some(&staff),
      None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Every successful mutation left exactly one audit entry.
    let response = request(
      state,
      "GET",
      &format!("/incidents/{id}/history"),
      Some(&student),
      None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let history = body_json(response).await["history"].clone();
    assert_eq!(history.as_array().unwrap().len(), 6);
  }

  #[tokio::test]
  async fn estudiante_list_is_scoped_to_own_reports() {
    let state = make_state().await;
    let u1 = signup(&state, "u1@utec.edu.pe", "estudiante").await;
    let u2 = signup(&state, "u2@utec.edu.pe", "estudiante").await;
    let authority = signup(&state, "a1@utec.edu.pe", "autoridad").await;

    create_incident(&state, &u1).await;
    create_incident(&state, &u1).await;

    let response =
      request(state.clone(), "GET", "/incidents", Some(&u2), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_json(response).await["incidents"]
      .as_array()
      .unwrap()
      .is_empty());

    let response =
      request(state.clone(), "GET", "/incidents", Some(&authority), None)
        .await;
    assert_eq!(
      body_json(response).await["incidents"].as_array().unwrap().len(),
      2
    );

    let response = request(
      state,
      "GET",
      "/incidents/admin?priority=alta,critica",
      Some(&authority),
      None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["stats"]["pendiente"], 2);
    assert_eq!(body["incidents"].as_array().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn staff_directory_requires_autoridad() {
    let state = make_state().await;
    signup(&state, "p1@utec.edu.pe", "personal").await;
    let staff = signup(&state, "p2@utec.edu.pe", "personal").await;
    let authority = signup(&state, "a1@utec.edu.pe", "autoridad").await;

    let response =
      request(state.clone(), "GET", "/staff", Some(&staff), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = request(state, "GET", "/staff", Some(&authority), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["count"], 2);
  }

  /// A real handshake request, so the upgrade extractor accepts it and the
  /// token check is what decides the outcome.
  async fn ws_handshake(
    state: AppState<SqliteStore>,
    uri: &str,
  ) -> axum::response::Response {
    let request = Request::builder()
      .method("GET")
      .uri(uri)
      .header(header::CONNECTION, "upgrade")
      .header(header::UPGRADE, "websocket")
      .header(header::SEC_WEBSOCKET_VERSION, "13")
      .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
      .body(Body::empty())
      .unwrap();
    router(state).oneshot(request).await.unwrap()
  }

  #[tokio::test]
  async fn ws_upgrade_requires_a_valid_token() {
    let state = make_state().await;

    let response = ws_handshake(state.clone(), "/ws").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = ws_handshake(state.clone(), "/ws?token=basura").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = signup(&state, "u1@utec.edu.pe", "estudiante").await;
    let response =
      ws_handshake(state, &format!("/ws?token={token}")).await;
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
  }
}
