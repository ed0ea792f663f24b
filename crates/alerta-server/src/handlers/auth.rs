//! Registration and login.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/auth/register` | Institutional emails only, password ≥ 8 chars |
//! | `POST` | `/auth/login` | Returns a bearer token |

use alerta_core::{Error, store::UserStore, user::{Role, User}};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;

use crate::{AppState, Store, auth, error::ApiError};

const INSTITUTIONAL_DOMAIN: &str = "@utec.edu.pe";
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
  pub email:    String,
  pub password: String,
  pub role:     String,
  #[serde(default)]
  pub full_name: String,
}

/// `POST /auth/register`
pub async fn register<S: Store>(
  State(state): State<AppState<S>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError> {
  let email = body.email.trim().to_lowercase();
  if email.is_empty() || body.password.is_empty() || body.role.trim().is_empty()
  {
    return Err(
      Error::Validation("email, password y role son obligatorios".to_string())
        .into(),
    );
  }
  if body.password.len() < MIN_PASSWORD_LEN {
    return Err(
      Error::Validation(
        "La contraseña debe tener al menos 8 caracteres".to_string(),
      )
      .into(),
    );
  }
  if !email.contains(INSTITUTIONAL_DOMAIN) {
    return Err(
      Error::Validation(
        "Solo se permiten correos institucionales @utec.edu.pe".to_string(),
      )
      .into(),
    );
  }
  let role = Role::normalize(&body.role)?;
  let password_hash = auth::hash_password(&body.password)?;
  let full_name = body.full_name.trim().to_string();

  let user = User::new(email.clone(), password_hash, role, full_name.clone());
  state.store.create_user(user).await?;
  tracing::info!(%email, %role, "user registered");

  Ok((
    StatusCode::CREATED,
    Json(json!({
      "message": "Usuario registrado",
      "user": { "email": email, "role": role, "fullName": full_name },
    })),
  ))
}

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub email:    String,
  pub password: String,
}

/// `POST /auth/login`
pub async fn login<S: Store>(
  State(state): State<AppState<S>>,
  Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError> {
  let email = body.email.trim().to_lowercase();
  if email.is_empty() || body.password.is_empty() {
    return Err(
      Error::Validation("email y password son requeridos".to_string()).into(),
    );
  }

  // One rejection for both unknown email and wrong password.
  let rejected =
    || Error::Unauthenticated("Credenciales inválidas".to_string());

  let user =
    state.store.get_user(email.clone()).await?.ok_or_else(rejected)?;
  if !auth::verify_password(&body.password, &user.password_hash) {
    return Err(rejected().into());
  }

  let token = state.tokens.issue(&user.email, user.role)?;
  state.store.update_last_login(email).await?;

  Ok(Json(json!({
    "message": "Autenticación exitosa",
    "token": token,
    "user": {
      "email": user.email,
      "role": user.role,
      "fullName": user.full_name,
    },
  })))
}
