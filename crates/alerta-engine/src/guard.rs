//! Explicit authorization guards.
//!
//! Invoked at the top of each engine operation, before any side effect, so
//! permission checks stay visible and testable independent of transport
//! framing.

use alerta_core::{Error, Result, claims::Claims, user::Role};

/// Reject expired claims. Signature verification happened upstream; expiry is
/// re-checked here so a long-held claim cannot outlive its credential.
pub fn authenticate(claims: &Claims) -> Result<()> {
  if claims.is_expired() {
    return Err(Error::Unauthenticated("credencial expirada".to_string()));
  }
  Ok(())
}

/// Reject claims whose role is not in `allowed`.
pub fn require_role(claims: &Claims, allowed: &[Role]) -> Result<()> {
  authenticate(claims)?;
  if !allowed.contains(&claims.role) {
    return Err(Error::Unauthorized(format!(
      "requiere uno de los roles: {}",
      allowed
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ")
    )));
  }
  Ok(())
}
