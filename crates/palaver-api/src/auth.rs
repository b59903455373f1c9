//! Session binding and credential verification.
//!
//! A login issues an opaque 32-byte token, carried in the
//! `palaver-session` cookie. Only the token's sha2 digest is persisted;
//! each protected request resolves the digest back to a user and loads a
//! fresh [`SessionContext`]. The context is identical whether the account
//! came from local registration or a federated login — nothing above this
//! module cares which.

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64;
use palaver_core::{
  store::ChatStore,
  user::{FederatedProfile, Settings, User, UserRef},
};
use rand_core::{OsRng, RngCore as _};
use sha2::{Digest as _, Sha256};

use crate::{AppState, error::ApiError};

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "palaver-session";

// ─── Tokens ──────────────────────────────────────────────────────────────────

/// Generate a fresh opaque session token.
pub fn new_session_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  B64.encode(bytes)
}

/// Digest under which a token is stored. The plaintext token never
/// reaches the store, so a leaked database cannot forge sessions.
pub fn token_digest(token: &str) -> String {
  B64.encode(Sha256::digest(token.as_bytes()))
}

/// `Set-Cookie` value installing `token` as the session cookie.
pub fn session_cookie(token: &str) -> String {
  format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value clearing the session cookie.
pub fn clear_session_cookie() -> String {
  format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Extract the session token from a request's `Cookie` header, if any.
pub fn token_from_headers(headers: &HeaderMap) -> Option<String> {
  let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
  cookies.split(';').find_map(|pair| {
    let (name, value) = pair.trim().split_once('=')?;
    (name == SESSION_COOKIE).then(|| value.to_string())
  })
}

// ─── Passwords ───────────────────────────────────────────────────────────────

/// Hash a password into an argon2 PHC string.
pub fn hash_password(password: &str) -> Result<String, ApiError> {
  let salt = SaltString::generate(&mut OsRng);
  Argon2::default()
    .hash_password(password.as_bytes(), &salt)
    .map(|h| h.to_string())
    .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))
}

/// Verify a plaintext password against a stored PHC string. A malformed
/// stored hash verifies as false rather than erroring — the caller must
/// not be able to distinguish it from a mismatch.
pub fn verify_password(password_hash: &str, password: &str) -> bool {
  let Ok(parsed) = PasswordHash::new(password_hash) else {
    return false;
  };
  Argon2::default()
    .verify_password(password.as_bytes(), &parsed)
    .is_ok()
}

// ─── Session context ─────────────────────────────────────────────────────────

/// The server-held context bound to an authenticated request.
#[derive(Debug, Clone)]
pub struct SessionContext {
  pub user_ref:     UserRef,
  pub email:        String,
  pub display_name: String,
  pub picture_url:  Option<String>,
  pub settings:     Settings,
}

impl SessionContext {
  pub fn from_user(user: User) -> Self {
    SessionContext {
      user_ref:     user.user_ref,
      email:        user.email,
      display_name: user.display_name,
      picture_url:  user.picture_url,
      settings:     user.settings,
    }
  }
}

/// Resolve a request's cookie to its session context.
pub async fn resolve_session<S: ChatStore>(
  headers: &HeaderMap,
  store: &S,
) -> Result<SessionContext, ApiError> {
  let token = token_from_headers(headers).ok_or(ApiError::Unauthenticated)?;
  let user_ref = store
    .resolve_login_session(token_digest(&token))
    .await?
    .ok_or(ApiError::Unauthenticated)?;
  let user = store
    .find_by_ref(user_ref)
    .await?
    .ok_or(ApiError::Unauthenticated)?;
  Ok(SessionContext::from_user(user))
}

impl<S> FromRequestParts<AppState<S>> for SessionContext
where
  S: ChatStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    resolve_session(&parts.headers, state.store.as_ref()).await
  }
}

// ─── Federated login ─────────────────────────────────────────────────────────

/// Complete a federated login from the verified identity tuple the OAuth
/// collaborator hands over. Upserts the user and opens a login session;
/// returns the fresh context and the cookie token. The redirect dance
/// itself lives outside this crate.
pub async fn login_federated<S: ChatStore>(
  store: &S,
  profile: FederatedProfile,
) -> Result<(SessionContext, String), ApiError> {
  let user = store.upsert_federated_user(profile).await?;
  let token = new_session_token();
  store
    .open_login_session(user.user_ref.clone(), token_digest(&token))
    .await?;
  Ok((SessionContext::from_user(user), token))
}
