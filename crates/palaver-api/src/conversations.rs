//! Handlers for chat-session listing, creation, and history retrieval.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/api/all_sessions` | Most recently updated first |
//! | `POST` | `/api/new_chat_session` | Returns the fresh session id |
//! | `GET`  | `/api/history/{session_id}` | 404 unless owned by the caller |

use axum::{
  Json,
  extract::{Path, State},
  response::IntoResponse,
};
use palaver_core::store::ChatStore;
use serde_json::json;
use uuid::Uuid;

use crate::{AppState, auth::SessionContext, error::ApiError};

/// `GET /api/all_sessions`
pub async fn all_sessions<S>(
  State(state): State<AppState<S>>,
  ctx: SessionContext,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChatStore + 'static,
{
  let sessions = state.store.list_chat_sessions(ctx.user_ref).await?;
  let rows: Vec<_> = sessions
    .iter()
    .map(|s| {
      json!({
        "session_id":   s.session_id,
        "title":        s.title,
        "last_updated": s.last_updated,
      })
    })
    .collect();
  Ok(Json(json!({ "sessions": rows })))
}

/// `POST /api/new_chat_session`
pub async fn new_chat_session<S>(
  State(state): State<AppState<S>>,
  ctx: SessionContext,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChatStore + 'static,
{
  let session = state.store.create_chat_session(ctx.user_ref).await?;
  Ok(Json(json!({
    "message":    "new chat session created",
    "session_id": session.session_id,
  })))
}

/// `GET /api/history/{session_id}`
///
/// The store merges "absent" and "not owned" into one `NotFound`, so this
/// returns the same 404 either way. A malformed id is also a 404: it
/// cannot name an existing session, and the JSON error body must hold for
/// every failure shape.
pub async fn history<S>(
  State(state): State<AppState<S>>,
  ctx: SessionContext,
  Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChatStore + 'static,
{
  let session_id = Uuid::parse_str(&session_id).map_err(|_| {
    ApiError::NotFound(format!("chat session {session_id} not found"))
  })?;
  let messages = state.store.get_history(session_id, ctx.user_ref).await?;
  let rows: Vec<_> = messages
    .iter()
    .map(|m| {
      json!({
        "role":  m.role,
        "parts": [{ "text": m.content }],
        "db_id": m.message_id,
      })
    })
    .collect();
  Ok(Json(json!({ "history": rows })))
}
