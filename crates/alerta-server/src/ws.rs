//! WebSocket subscriptions.
//!
//! `GET /ws?token=...` authenticates via the query string (browsers cannot
//! set headers on upgrade requests), registers the connection, and serves
//! one socket per task. Inbound `ping` messages refresh the registry TTL;
//! anything else is acknowledged and ignored. Outbound events arrive through
//! [`WsSink`], the realtime half of the fan-out.

use std::{collections::HashMap, time::Duration};

use alerta_core::{claims::Claims, store::ConnectionRegistry};
use alerta_engine::{DeliveryError, DeliverySink, Envelope};
use axum::{
  extract::{
    Query, State, WebSocketUpgrade,
    ws::{Message, WebSocket},
  },
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

// ─── Delivery sink ───────────────────────────────────────────────────────────

/// Maps connection ids to the outbound channel of their socket task. A
/// missing or closed channel reports [`DeliveryError::Gone`] so the fan-out
/// prunes the registry row.
#[derive(Default)]
pub struct WsSink {
  channels: RwLock<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl WsSink {
  async fn register(
    &self,
    connection_id: String,
    tx: mpsc::UnboundedSender<String>,
  ) {
    self.channels.write().await.insert(connection_id, tx);
  }

  async fn unregister(&self, connection_id: &str) {
    self.channels.write().await.remove(connection_id);
  }
}

impl DeliverySink for WsSink {
  async fn deliver(
    &self,
    connection_id: &str,
    envelope: &Envelope,
  ) -> Result<(), DeliveryError> {
    let payload = serde_json::to_string(envelope)
      .map_err(|e| DeliveryError::Transport(e.to_string()))?;
    let channels = self.channels.read().await;
    match channels.get(connection_id) {
      Some(tx) => tx.send(payload).map_err(|_| DeliveryError::Gone),
      None => Err(DeliveryError::Gone),
    }
  }
}

// ─── Upgrade handler ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct WsParams {
  token: Option<String>,
}

/// `GET /ws?token=<session token>`
pub async fn upgrade<S: crate::Store>(
  State(state): State<crate::AppState<S>>,
  Query(params): Query<WsParams>,
  ws: WebSocketUpgrade,
) -> Response {
  let token = match params.token.as_deref().map(str::trim) {
    Some(token) if !token.is_empty() => token.to_string(),
    _ => {
      return (
        StatusCode::UNAUTHORIZED,
        "Token requerido en querystring (?token=...)",
      )
        .into_response();
    }
  };
  let claims = match state.tokens.decode(&token) {
    Ok(claims) => claims,
    Err(error) => {
      return (StatusCode::UNAUTHORIZED, error.to_string()).into_response();
    }
  };
  ws.on_upgrade(move |socket| serve_socket(state, claims, socket))
}

async fn serve_socket<S: crate::Store>(
  state: crate::AppState<S>,
  claims: Claims,
  mut socket: WebSocket,
) {
  let connection_id = Uuid::new_v4().to_string();
  let ttl = Duration::from_secs(state.config.connection_ttl_seconds);

  let (tx, mut rx) = mpsc::unbounded_channel::<String>();
  state.sink.register(connection_id.clone(), tx).await;
  if let Err(error) = state
    .store
    .save(
      connection_id.clone(),
      claims.subject.clone(),
      claims.role,
      ttl,
    )
    .await
  {
    tracing::error!(%error, "failed to register connection");
    state.sink.unregister(&connection_id).await;
    return;
  }
  tracing::info!(%connection_id, user = %claims.subject, "subscribed");

  loop {
    tokio::select! {
      outbound = rx.recv() => match outbound {
        Some(payload) => {
          if socket.send(Message::Text(payload.into())).await.is_err() {
            break;
          }
        }
        None => break,
      },
      inbound = socket.recv() => match inbound {
        Some(Ok(Message::Text(text))) => {
          let reply = if is_ping(&text) {
            if let Err(error) =
              state.store.touch(connection_id.clone(), ttl).await
            {
              tracing::warn!(%connection_id, %error, "ping touch failed");
            }
            "pong"
          } else {
            "Mensajes personalizados no soportados. Conexión activa."
          };
          if socket.send(Message::Text(reply.into())).await.is_err() {
            break;
          }
        }
        Some(Ok(Message::Close(_))) | None => break,
        Some(Ok(_)) => {}
        Some(Err(_)) => break,
      },
    }
  }

  state.sink.unregister(&connection_id).await;
  if let Err(error) = state.store.delete(connection_id.clone()).await {
    tracing::warn!(%connection_id, %error, "failed to delete connection");
  }
  tracing::info!(%connection_id, "unsubscribed");
}

/// Accept both a bare `ping` and `{"action": "ping"}`.
fn is_ping(text: &str) -> bool {
  if text.trim().eq_ignore_ascii_case("ping") {
    return true;
  }
  serde_json::from_str::<serde_json::Value>(text)
    .ok()
    .and_then(|value| {
      value.get("action").and_then(|a| a.as_str()).map(|a| a == "ping")
    })
    .unwrap_or(false)
}
