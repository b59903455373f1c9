//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with fixed microsecond
//! precision, so lexicographic comparison in SQL matches chronological
//! order. UUIDs are stored as hyphenated lowercase strings; user refs use
//! their tagged [`UserRef::encode`] form.

use chrono::{DateTime, SecondsFormat, Utc};
use palaver_core::{
  conversation::{Message, Role},
  user::{Settings, User, UserRef},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Role ────────────────────────────────────────────────────────────────────

pub fn encode_role(role: Role) -> &'static str {
  match role {
    Role::User => "user",
    Role::Model => "model",
  }
}

pub fn decode_role(s: &str) -> Result<Role> {
  match s {
    "user" => Ok(Role::User),
    "model" => Ok(Role::Model),
    other => Err(Error::UnknownRole(other.to_string())),
  }
}

// ─── Raw row types ───────────────────────────────────────────────────────────

/// A `users` row as read from SQLite, before decoding.
pub struct RawUser {
  pub user_ref:      String,
  pub email:         String,
  pub display_name:  String,
  pub provider_id:   Option<String>,
  pub picture_url:   Option<String>,
  pub password_hash: Option<String>,
  pub last_login:    String,
  pub theme:         String,
  pub language:      String,
  pub voice:         String,
}

impl RawUser {
  pub fn into_user(self) -> Result<User, palaver_core::Error> {
    Ok(User {
      user_ref:      UserRef::decode(&self.user_ref)?,
      email:         self.email,
      display_name:  self.display_name,
      provider_id:   self.provider_id,
      picture_url:   self.picture_url,
      password_hash: self.password_hash,
      last_login:    decode_dt(&self.last_login)?,
      settings:      Settings {
        theme:    self.theme,
        language: self.language,
        voice:    self.voice,
      },
    })
  }
}

/// A `messages` row as read from SQLite, before decoding.
pub struct RawMessage {
  pub message_id:   String,
  pub session_id:   String,
  pub user_ref:     String,
  pub role:         String,
  pub content:      String,
  pub created_at:   String,
  pub content_type: String,
}

impl RawMessage {
  pub fn into_message(self) -> Result<Message, palaver_core::Error> {
    Ok(Message {
      message_id:   decode_uuid(&self.message_id)?,
      session_id:   decode_uuid(&self.session_id)?,
      owner:        UserRef::decode(&self.user_ref)?,
      role:         decode_role(&self.role)?,
      content:      self.content,
      created_at:   decode_dt(&self.created_at)?,
      content_type: self.content_type,
    })
  }
}
