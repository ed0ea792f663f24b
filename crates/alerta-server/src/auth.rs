//! Credential issuance and verification.
//!
//! Passwords are stored as argon2 PHC strings. Sessions are HS256 tokens
//! (`{"sub", "role", "iat", "exp"}`) signed with the server's configured
//! secret; the signature check is constant-time via [`hmac::Mac`]. Everything
//! past this module only ever sees a verified [`Claims`].

use alerta_core::{Error, Result, claims::Claims, user::Role};
use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{header, request::Parts},
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::{AppState, Store, error::ApiError};

type HmacSha256 = Hmac<Sha256>;

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Hash a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|hash| hash.to_string())
    .map_err(Error::internal)
}

/// Verify a password against a stored PHC string. A malformed stored hash
/// verifies as false rather than erroring.
pub fn verify_password(password: &str, stored: &str) -> bool {
  PasswordHash::new(stored)
    .map(|hash| {
      Argon2::default().verify_password(password.as_bytes(), &hash).is_ok()
    })
    .unwrap_or(false)
}

// ─── Session tokens ──────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
struct TokenPayload {
  sub:  String,
  role: Role,
  iat:  i64,
  exp:  i64,
}

/// Issues and verifies HS256 session tokens.
pub struct TokenSigner {
  secret: Vec<u8>,
  ttl:    chrono::Duration,
}

impl TokenSigner {
  pub fn new(secret: &str, ttl_seconds: i64) -> Self {
    Self {
      secret: secret.as_bytes().to_vec(),
      ttl:    chrono::Duration::seconds(ttl_seconds),
    }
  }

  /// Issue a signed token for an authenticated user.
  pub fn issue(&self, email: &str, role: Role) -> Result<String> {
    let now = Utc::now();
    let payload = TokenPayload {
      sub:  email.to_string(),
      role,
      iat:  now.timestamp(),
      exp:  (now + self.ttl).timestamp(),
    };
    let header = B64URL.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = B64URL
      .encode(serde_json::to_vec(&payload).map_err(Error::internal)?);
    let signing_input = format!("{header}.{payload}");

    let mut mac = HmacSha256::new_from_slice(&self.secret)
      .map_err(Error::internal)?;
    mac.update(signing_input.as_bytes());
    let signature = B64URL.encode(mac.finalize().into_bytes());
    Ok(format!("{signing_input}.{signature}"))
  }

  /// Verify a token's signature and expiry and return its claims.
  pub fn decode(&self, token: &str) -> Result<Claims> {
    let invalid = || Error::Unauthenticated("Token inválido".to_string());

    let mut parts = token.splitn(3, '.');
    let (header, payload, signature) =
      match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s)) => (h, p, s),
        _ => return Err(invalid()),
      };

    let signature = B64URL.decode(signature).map_err(|_| invalid())?;
    let mut mac = HmacSha256::new_from_slice(&self.secret)
      .map_err(Error::internal)?;
    mac.update(format!("{header}.{payload}").as_bytes());
    mac.verify_slice(&signature).map_err(|_| invalid())?;

    let payload = B64URL.decode(payload).map_err(|_| invalid())?;
    let payload: TokenPayload =
      serde_json::from_slice(&payload).map_err(|_| invalid())?;

    let expires_at =
      DateTime::<Utc>::from_timestamp(payload.exp, 0).ok_or_else(invalid)?;
    if expires_at < Utc::now() {
      return Err(Error::Unauthenticated("Token expirado".to_string()));
    }
    Ok(Claims::new(payload.sub, payload.role, expires_at))
  }
}

// ─── Extraction ──────────────────────────────────────────────────────────────

/// Resolve the `Authorization: Bearer <token>` header into claims.
pub fn bearer_claims(
  headers: &axum::http::HeaderMap,
  signer: &TokenSigner,
) -> Result<Claims> {
  let value = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or_else(|| {
      Error::Unauthenticated("Falta el encabezado Authorization".to_string())
    })?;
  let token = value.strip_prefix("Bearer ").ok_or_else(|| {
    Error::Unauthenticated("Se espera un token Bearer".to_string())
  })?;
  signer.decode(token.trim())
}

/// Extractor: present in a handler means the bearer token verified.
pub struct Auth(pub Claims);

impl<S: Store> FromRequestParts<AppState<S>> for Auth {
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    bearer_claims(&parts.headers, &state.tokens)
      .map(Auth)
      .map_err(ApiError::from)
  }
}
