//! Notification fan-out.
//!
//! Resolves target connections from the registry and pushes event envelopes
//! through a [`DeliverySink`]. Delivery is independent per connection: one
//! failed push never blocks the others, and no failure here ever reaches the
//! caller of the mutation that triggered the broadcast.

use std::{future::Future, sync::Arc};

use alerta_core::{connection::Connection, store::ConnectionRegistry, user::Role};
use serde::Serialize;
use thiserror::Error;

use crate::event::{Envelope, EventType};

/// Outcome of a single push attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
  /// The endpoint no longer exists; the connection should be pruned.
  #[error("connection is gone")]
  Gone,
  /// Any other transport failure. Logged and swallowed.
  #[error("transport: {0}")]
  Transport(String),
}

/// The realtime transport boundary. The server implements this over its
/// WebSocket connections; tests implement it with recording mocks.
pub trait DeliverySink: Send + Sync {
  fn deliver(
    &self,
    connection_id: &str,
    envelope: &Envelope,
  ) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Fan-out over a [`ConnectionRegistry`] and a [`DeliverySink`].
pub struct Notifier<R, D> {
  registry: Arc<R>,
  sink:     Arc<D>,
}

impl<R, D> Clone for Notifier<R, D> {
  fn clone(&self) -> Self {
    Self {
      registry: Arc::clone(&self.registry),
      sink:     Arc::clone(&self.sink),
    }
  }
}

impl<R: ConnectionRegistry, D: DeliverySink> Notifier<R, D> {
  pub fn new(registry: Arc<R>, sink: Arc<D>) -> Self {
    Self { registry, sink }
  }

  /// Deliver `{type, data}` to every live connection held by the given
  /// roles.
  pub async fn broadcast_to_roles<T: Serialize>(
    &self,
    roles: &[Role],
    event: EventType,
    data: &T,
  ) {
    let connections = match self.registry.query_by_roles(roles.to_vec()).await
    {
      Ok(connections) => connections,
      Err(error) => {
        tracing::warn!(event = event.as_str(), %error, "fan-out registry query failed");
        return;
      }
    };
    self.dispatch(connections, event, data).await;
  }

  /// Deliver `{type, data}` to every live connection of one user identity.
  pub async fn notify_user<T: Serialize>(
    &self,
    user: &str,
    event: EventType,
    data: &T,
  ) {
    let connections =
      match self.registry.query_by_user(user.to_string()).await {
        Ok(connections) => connections,
        Err(error) => {
          tracing::warn!(user, event = event.as_str(), %error, "fan-out registry query failed");
          return;
        }
      };
    self.dispatch(connections, event, data).await;
  }

  async fn dispatch<T: Serialize>(
    &self,
    connections: Vec<Connection>,
    event: EventType,
    data: &T,
  ) {
    let data = match serde_json::to_value(data) {
      Ok(data) => data,
      Err(error) => {
        tracing::warn!(event = event.as_str(), %error, "fan-out payload serialization failed");
        return;
      }
    };
    let envelope = Envelope { event, data };

    for connection in connections {
      match self.sink.deliver(&connection.connection_id, &envelope).await {
        Ok(()) => {}
        Err(DeliveryError::Gone) => {
          // Reactive pruning; lazy TTL expiry handles the rest.
          if let Err(error) =
            self.registry.delete(connection.connection_id.clone()).await
          {
            tracing::warn!(
              connection_id = %connection.connection_id,
              %error,
              "failed to prune gone connection"
            );
          }
        }
        Err(DeliveryError::Transport(reason)) => {
          tracing::warn!(
            connection_id = %connection.connection_id,
            event = event.as_str(),
            %reason,
            "delivery failed"
          );
        }
      }
    }
  }
}
