//! Handlers for registration, login, logout, and profile updates.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/api/register` | 201 + session cookie; 409 on duplicate email |
//! | `POST` | `/api/login` | 200 + session cookie; uniform 401 on bad credentials |
//! | `POST` | `/api/logout` | Closes the login session, clears the cookie |
//! | `PUT`  | `/api/update_profile` | Partial update; 400 on an empty field set |

use axum::{
  Json,
  extract::State,
  http::{HeaderMap, StatusCode, header},
  response::IntoResponse,
};
use palaver_core::{
  store::ChatStore,
  user::{NewLocalUser, ProfileUpdate, User},
};
use serde::Deserialize;
use serde_json::json;

use crate::{
  AppState,
  auth::{
    self, SessionContext, clear_session_cookie, new_session_token,
    session_cookie, token_digest, token_from_headers,
  },
  error::ApiError,
};

/// JSON view of a user returned by profile endpoints. Never includes the
/// password hash.
fn user_payload(user: &User) -> serde_json::Value {
  json!({
    "displayName": user.display_name,
    "email":       user.email,
    "pictureUrl":  user.picture_url,
    "theme":       user.settings.theme,
    "language":    user.settings.language,
    "voice":       user.settings.voice,
  })
}

// ─── Register ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
  pub display_name: Option<String>,
  /// The username doubles as the email address.
  pub username:     Option<String>,
  pub password:     Option<String>,
}

/// `POST /api/register`
pub async fn register<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChatStore,
{
  let (Some(display_name), Some(username), Some(password)) =
    (body.display_name, body.username, body.password)
  else {
    return Err(ApiError::InvalidArgument(
      "missing display name, username, or password".into(),
    ));
  };
  if display_name.is_empty() || username.is_empty() || password.is_empty() {
    return Err(ApiError::InvalidArgument(
      "missing display name, username, or password".into(),
    ));
  }

  let user = state
    .store
    .create_local_user(NewLocalUser {
      email: username,
      display_name,
      password_hash: auth::hash_password(&password)?,
    })
    .await?;

  // Log the fresh user in immediately.
  let token = new_session_token();
  state
    .store
    .open_login_session(user.user_ref.clone(), token_digest(&token))
    .await?;

  Ok((
    StatusCode::CREATED,
    [(header::SET_COOKIE, session_cookie(&token))],
    Json(json!({
      "message": "registration successful",
      "user_id": user.user_ref.encode(),
    })),
  ))
}

// ─── Login ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub username: Option<String>,
  pub password: Option<String>,
}

/// `POST /api/login`
///
/// Unknown email, missing stored hash, and hash mismatch all collapse to
/// the same 401 so the response never reveals whether an email exists.
pub async fn login<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChatStore,
{
  let (Some(username), Some(password)) = (body.username, body.password) else {
    return Err(ApiError::InvalidArgument(
      "missing username or password".into(),
    ));
  };

  let verified = state
    .store
    .find_by_email(username)
    .await?
    .filter(|user| {
      user
        .password_hash
        .as_deref()
        .is_some_and(|hash| auth::verify_password(hash, &password))
    })
    .ok_or(ApiError::Unauthenticated)?;

  state.store.touch_last_login(verified.user_ref.clone()).await?;

  let token = new_session_token();
  state
    .store
    .open_login_session(verified.user_ref, token_digest(&token))
    .await?;

  Ok((
    StatusCode::OK,
    [(header::SET_COOKIE, session_cookie(&token))],
    Json(json!({ "message": "login successful" })),
  ))
}

// ─── Logout ──────────────────────────────────────────────────────────────────

/// `POST /api/logout` — idempotent; succeeds even without a session.
pub async fn logout<S>(
  State(state): State<AppState<S>>,
  headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChatStore,
{
  if let Some(token) = token_from_headers(&headers) {
    state.store.close_login_session(token_digest(&token)).await?;
  }

  Ok((
    StatusCode::OK,
    [(header::SET_COOKIE, clear_session_cookie())],
    Json(json!({ "message": "logged out" })),
  ))
}

// ─── Update profile ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileBody {
  pub display_name: Option<String>,
  pub email:        Option<String>,
  pub theme:        Option<String>,
  pub language:     Option<String>,
  pub voice:        Option<String>,
}

/// `PUT /api/update_profile`
pub async fn update_profile<S>(
  State(state): State<AppState<S>>,
  ctx: SessionContext,
  Json(body): Json<UpdateProfileBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChatStore + 'static,
{
  let update = ProfileUpdate {
    display_name: body.display_name,
    email:        body.email,
    theme:        body.theme,
    language:     body.language,
    voice:        body.voice,
  };

  // An empty field set is rejected by the store as InvalidArgument.
  let user = state.store.update_profile(ctx.user_ref, update).await?;

  Ok(Json(json!({
    "message": "profile updated successfully",
    "user": user_payload(&user),
  })))
}
