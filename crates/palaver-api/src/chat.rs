//! The chat-proxy pipeline: `POST /api/chat`.
//!
//! One request moves through validation, a best-effort user-turn write,
//! a single bounded upstream call, response interpretation, a best-effort
//! model-turn write, and finally returns the upstream body verbatim so the
//! browser can apply its own rendering. No step is retried; callers
//! resubmit on failure.

use axum::{Json, extract::State, response::IntoResponse};
use palaver_core::{
  conversation::{NewMessage, Role, WritePolicy},
  store::ChatStore,
  user::UserRef,
};
use palaver_upstream::{Content, Part, interpret};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{AppState, auth::SessionContext, error::ApiError};

/// Decoded-size budget for one inline image. Base64 carries 3 bytes per
/// 4 characters, so the decoded size is estimated as `len * 3 / 4`.
pub const MAX_INLINE_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Placeholder recorded in message content in place of inline image
/// bytes. The binary payload itself is never stored.
const IMAGE_PLACEHOLDER: &str = "[image]";

#[derive(Debug, Deserialize)]
pub struct ChatBody {
  /// Kept as a string so a missing or malformed id maps to 400, not to a
  /// deserialisation rejection.
  pub session_id:    Option<String>,
  #[serde(default)]
  pub contents:      Vec<Content>,
  pub language_name: Option<String>,
}

/// `POST /api/chat`
pub async fn handler<S>(
  State(state): State<AppState<S>>,
  ctx: SessionContext,
  Json(body): Json<ChatBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ChatStore + 'static,
{
  // ── Validating ──────────────────────────────────────────────────────
  let session_id = body
    .session_id
    .as_deref()
    .ok_or_else(|| {
      ApiError::InvalidArgument("session_id is required in the payload".into())
    })
    .and_then(|raw| {
      Uuid::parse_str(raw).map_err(|_| {
        ApiError::InvalidArgument("session_id is not a valid id".into())
      })
    })?;

  if body.contents.is_empty() {
    return Err(ApiError::InvalidArgument("message list is empty".into()));
  }

  let language = normalize_language(body.language_name.as_deref());
  let user_turn = flatten_user_turn(&body.contents)?;

  // Ownership is enforced before any mutation: a caller holding someone
  // else's session id gets a 404 here, before anything is written.
  state
    .store
    .touch_chat_session(session_id, ctx.user_ref.clone())
    .await?;

  // ── PersistingUserTurn ──────────────────────────────────────────────
  if !user_turn.is_empty() {
    append_with_policy(
      state.store.as_ref(),
      NewMessage {
        session_id,
        owner:   ctx.user_ref.clone(),
        role:    Role::User,
        content: user_turn,
      },
      WritePolicy::BestEffort,
    )
    .await?;
  }

  // ── CallingUpstream ─────────────────────────────────────────────────
  let mut final_contents =
    Vec::with_capacity(body.contents.len() + 1);
  final_contents.push(Content {
    role:  "user".into(),
    parts: vec![Part::text(compose_instruction(&language))],
  });
  final_contents.extend(body.contents);

  let upstream_body = state.upstream.generate(&final_contents).await?;

  // ── InterpretingResponse / PersistingModelTurn ──────────────────────
  let reply = interpret(&upstream_body);
  if reply.is_persistable() {
    append_with_policy(
      state.store.as_ref(),
      NewMessage {
        session_id,
        owner:   ctx.user_ref.clone(),
        role:    Role::Model,
        content: reply.into_text(),
      },
      WritePolicy::BestEffort,
    )
    .await?;
  }

  // ── Responding ──────────────────────────────────────────────────────
  // The full upstream body, verbatim.
  Ok(Json(upstream_body))
}

// ─── Pipeline helpers ────────────────────────────────────────────────────────

fn normalize_language(language_name: Option<&str>) -> String {
  match language_name.map(str::trim) {
    Some(name) if !name.is_empty() => name.to_string(),
    _ => "English".to_string(),
  }
}

/// Flatten the most recent user turn into one content string: text parts
/// space-joined, inline images validated and replaced by a placeholder.
/// Returns an empty string when the last turn is not user-authored.
fn flatten_user_turn(contents: &[Content]) -> Result<String, ApiError> {
  let Some(last) = contents.last().filter(|c| c.role == "user") else {
    return Ok(String::new());
  };

  let mut pieces: Vec<&str> = Vec::with_capacity(last.parts.len());
  for part in &last.parts {
    if let Some(text) = &part.text {
      pieces.push(text);
    } else if let Some(inline) = &part.inline_data {
      if !inline.mime_type.starts_with("image/") {
        return Err(ApiError::InvalidArgument(
          "unsupported inline data type; only images are allowed".into(),
        ));
      }
      if inline.data.len() * 3 / 4 > MAX_INLINE_IMAGE_BYTES {
        return Err(ApiError::PayloadTooLarge(
          "image size exceeds the 5MB limit".into(),
        ));
      }
      pieces.push(IMAGE_PLACEHOLDER);
    }
  }

  Ok(pieces.join(" ").trim().to_string())
}

/// Append a message under the given policy. `BestEffort` logs the failure
/// and lets the pipeline continue: chat delivery is never blocked by a
/// storage hiccup.
async fn append_with_policy<S: ChatStore>(
  store: &S,
  input: NewMessage,
  policy: WritePolicy,
) -> Result<(), ApiError> {
  let session_id = input.session_id;
  match store.append_message(input).await {
    Ok(_) => Ok(()),
    Err(e) => match policy {
      WritePolicy::Required => Err(e.into()),
      WritePolicy::BestEffort => {
        tracing::warn!(%session_id, error = %e, "message not persisted");
        Ok(())
      }
    },
  }
}

/// System instruction prepended to every upstream call: persona,
/// formatting policy, and the requested output language.
fn compose_instruction(language: &str) -> String {
  format!(
    "You are Palaver, a helpful AI assistant.\n\
     Your role is to provide clear, structured, and helpful responses to \
     user queries.\n\
     \n\
     Always format responses as a short, relevant title followed by a \
     detailed but friendly explanation.\n\
     \n\
     IMPORTANT:\n\
     - If you provide code, always use proper Markdown code blocks.\n\
     - If you reference information, mention it generally. Do not \
     hallucinate specific sources if you don't have them.\n\
     - Ensure your response is in {language} language.\n"
  )
}
