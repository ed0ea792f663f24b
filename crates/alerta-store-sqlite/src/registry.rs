//! [`ConnectionRegistry`] implementation on the same SQLite handle.
//!
//! Expiry is lazy: rows past `expires_at` are skipped by queries rather than
//! reaped eagerly. The fixed-width RFC 3339 encoding makes the string
//! comparison in SQL equivalent to a chronological one.

use std::time::Duration;

use alerta_core::{
  Error, Result, connection::Connection, store::ConnectionRegistry, user::Role,
};
use chrono::Utc;

use crate::{
  encode::{RawConnection, encode_dt},
  store::SqliteStore,
};

fn expiry_bounds(ttl: Duration) -> Result<(String, String)> {
  let now = Utc::now();
  let ttl = chrono::Duration::from_std(ttl).map_err(Error::internal)?;
  Ok((encode_dt(now), encode_dt(now + ttl)))
}

fn row_to_raw_connection(
  row: &rusqlite::Row<'_>,
) -> rusqlite::Result<RawConnection> {
  Ok(RawConnection {
    connection_id: row.get(0)?,
    user_email:    row.get(1)?,
    role:          row.get(2)?,
    connected_at:  row.get(3)?,
    last_ping_at:  row.get(4)?,
    expires_at:    row.get(5)?,
  })
}

const CONNECTION_COLUMNS: &str =
  "connection_id, user_email, role, connected_at, last_ping_at, expires_at";

impl ConnectionRegistry for SqliteStore {
  async fn save(
    &self,
    connection_id: String,
    user: String,
    role: Role,
    ttl: Duration,
  ) -> Result<()> {
    let role_str = role.to_string();
    let (now_str, expires_str) = expiry_bounds(ttl)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO connections
             (connection_id, user_email, role, connected_at, last_ping_at, expires_at)
           VALUES (?1, ?2, ?3, ?4, ?4, ?5)",
          rusqlite::params![connection_id, user, role_str, now_str, expires_str],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::internal)
  }

  async fn touch(&self, connection_id: String, ttl: Duration) -> Result<()> {
    let (now_str, expires_str) = expiry_bounds(ttl)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE connections SET last_ping_at = ?2, expires_at = ?3
           WHERE connection_id = ?1",
          rusqlite::params![connection_id, now_str, expires_str],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::internal)
  }

  async fn delete(&self, connection_id: String) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM connections WHERE connection_id = ?1",
          rusqlite::params![connection_id],
        )?;
        Ok(())
      })
      .await
      .map_err(Error::internal)
  }

  async fn query_by_roles(&self, roles: Vec<Role>) -> Result<Vec<Connection>> {
    if roles.is_empty() {
      return Ok(Vec::new());
    }
    let role_strs: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
    let now_str = encode_dt(Utc::now());

    let raws: Vec<RawConnection> = self
      .conn
      .call(move |conn| {
        let placeholders = (1..=role_strs.len())
          .map(|i| format!("?{i}"))
          .collect::<Vec<_>>()
          .join(", ");
        let now_param = role_strs.len() + 1;
        let sql = format!(
          "SELECT {CONNECTION_COLUMNS} FROM connections
           WHERE role IN ({placeholders}) AND expires_at > ?{now_param}"
        );
        let params: Vec<&dyn rusqlite::ToSql> = role_strs
          .iter()
          .map(|s| s as &dyn rusqlite::ToSql)
          .chain(std::iter::once(&now_str as &dyn rusqlite::ToSql))
          .collect();
        let rows = conn
          .prepare(&sql)?
          .query_map(&params[..], row_to_raw_connection)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::internal)?;

    raws.into_iter().map(RawConnection::into_connection).collect()
  }

  async fn query_by_user(&self, user: String) -> Result<Vec<Connection>> {
    let now_str = encode_dt(Utc::now());

    let raws: Vec<RawConnection> = self
      .conn
      .call(move |conn| {
        let rows = conn
          .prepare(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections
             WHERE user_email = ?1 AND expires_at > ?2"
          ))?
          .query_map(rusqlite::params![user, now_str], row_to_raw_connection)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(Error::internal)?;

    raws.into_iter().map(RawConnection::into_connection).collect()
  }
}
