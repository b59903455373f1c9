//! Conversation entities — chat sessions and their messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::UserRef;

/// Title given to a session at creation, replaced lazily on first listing
/// once the session holds a user message.
pub const PLACEHOLDER_TITLE: &str = "New Chat Session";

/// Number of characters of the first user message used as a derived title.
pub const TITLE_MAX_CHARS: usize = 40;

// ─── ChatSession ─────────────────────────────────────────────────────────────

/// A conversation thread owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
  pub session_id:   Uuid,
  pub owner:        UserRef,
  pub created_at:   DateTime<Utc>,
  pub last_updated: DateTime<Utc>,
  pub title:        String,
}

/// Listing row for a user's sessions, most recent first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
  pub session_id:   Uuid,
  pub title:        String,
  pub last_updated: DateTime<Utc>,
}

// ─── Message ─────────────────────────────────────────────────────────────────

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Model,
}

/// One turn in a conversation. Immutable once written; ordering within a
/// session is by the store-assigned `created_at`.
///
/// Only text content is stored — inline image payloads are summarised to a
/// placeholder before they reach the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
  pub message_id:   Uuid,
  pub session_id:   Uuid,
  /// Denormalised owner, kept for authorization checks on reads.
  pub owner:        UserRef,
  pub role:         Role,
  pub content:      String,
  pub created_at:   DateTime<Utc>,
  pub content_type: String,
}

/// Input for [`ChatStore::append_message`](crate::store::ChatStore). The
/// store trims the content and assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub session_id: Uuid,
  pub owner:      UserRef,
  pub role:       Role,
  pub content:    String,
}

/// How a message write participates in the request's failure semantics.
///
/// The chat pipeline writes turns `BestEffort`: chat delivery takes
/// priority over logging completeness, so a storage hiccup is logged and
/// the request proceeds. The flag makes that decision visible at each
/// call site instead of hiding it in exception suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePolicy {
  Required,
  BestEffort,
}

/// Derive a session title from the first user message: the first
/// [`TITLE_MAX_CHARS`] characters, with an ellipsis when truncated.
/// Pure and deterministic, so racing derivations converge on one value.
pub fn derive_title(first_user_message: &str) -> String {
  let mut title: String =
    first_user_message.chars().take(TITLE_MAX_CHARS).collect();
  if first_user_message.chars().count() > TITLE_MAX_CHARS {
    title.push_str("...");
  }
  title
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn derive_title_short_message_unchanged() {
    assert_eq!(derive_title("hi"), "hi");
  }

  #[test]
  fn derive_title_truncates_at_forty_chars() {
    let long = "a".repeat(80);
    let title = derive_title(&long);
    assert_eq!(title, format!("{}...", "a".repeat(40)));
  }

  #[test]
  fn derive_title_is_idempotent_on_input() {
    let msg = "what is the airspeed velocity of an unladen swallow";
    assert_eq!(derive_title(msg), derive_title(msg));
  }

  #[test]
  fn role_serialises_lowercase() {
    assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    assert_eq!(serde_json::to_string(&Role::Model).unwrap(), "\"model\"");
  }
}
