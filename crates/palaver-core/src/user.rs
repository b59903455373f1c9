//! User identity — one record per email, unifying local and federated
//! accounts into a single id space.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── UserRef ─────────────────────────────────────────────────────────────────

/// A reference into the unified identity space.
///
/// Local accounts get a generated UUID at registration; federated accounts
/// are keyed by the provider's subject id. Everything above the identity
/// store treats the two uniformly — the tag exists so the store can match
/// on it instead of sniffing string shapes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum UserRef {
  Local(Uuid),
  Federated(String),
}

impl UserRef {
  /// Stable text encoding used as the primary key in storage and in the
  /// login-session table: `local:<uuid>` or `fed:<subject>`.
  pub fn encode(&self) -> String {
    match self {
      UserRef::Local(id) => format!("local:{id}"),
      UserRef::Federated(sub) => format!("fed:{sub}"),
    }
  }

  /// Inverse of [`encode`](Self::encode). Pattern-matches on the tag
  /// prefix; an unrecognised tag is an error, never a guess.
  pub fn decode(s: &str) -> Result<Self, crate::Error> {
    if let Some(raw) = s.strip_prefix("local:") {
      let id = Uuid::parse_str(raw)
        .map_err(|e| crate::Error::Internal(Box::new(e)))?;
      Ok(UserRef::Local(id))
    } else if let Some(sub) = s.strip_prefix("fed:") {
      Ok(UserRef::Federated(sub.to_string()))
    } else {
      Err(crate::Error::InvalidArgument(format!(
        "unrecognised user ref encoding: {s:?}"
      )))
    }
  }
}

impl fmt::Display for UserRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.encode())
  }
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// Per-user display preferences, carried in the session context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
  pub theme:    String,
  pub language: String,
  pub voice:    String,
}

impl Default for Settings {
  fn default() -> Self {
    Settings {
      theme:    "dark".to_string(),
      language: "en-US".to_string(),
      voice:    String::new(),
    }
  }
}

// ─── User ────────────────────────────────────────────────────────────────────

/// A persisted identity record.
///
/// Exactly one user exists per email. At creation exactly one auth method
/// is populated: `password_hash` for local registration, `provider_id` for
/// federated login. Linking the two later is out of scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
  pub user_ref:      UserRef,
  pub email:         String,
  pub display_name:  String,
  pub provider_id:   Option<String>,
  pub picture_url:   Option<String>,
  /// Argon2 PHC string. Never serialised into API responses.
  #[serde(skip_serializing)]
  pub password_hash: Option<String>,
  pub last_login:    DateTime<Utc>,
  pub settings:      Settings,
}

/// Input for local registration. The caller hashes the password before
/// this struct exists — plaintext never crosses the store boundary.
#[derive(Debug, Clone)]
pub struct NewLocalUser {
  pub email:         String,
  pub display_name:  String,
  pub password_hash: String,
}

/// The verified identity tuple handed over by the OAuth collaborator.
/// This is Palaver's entire contract with the federated provider.
#[derive(Debug, Clone)]
pub struct FederatedProfile {
  pub email:        String,
  pub display_name: String,
  pub subject_id:   String,
  pub picture_url:  Option<String>,
}

/// A partial profile update. Only the populated fields are applied; an
/// entirely empty update is rejected by the store.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
  pub display_name: Option<String>,
  pub email:        Option<String>,
  pub theme:        Option<String>,
  pub language:     Option<String>,
  pub voice:        Option<String>,
}

impl ProfileUpdate {
  pub fn is_empty(&self) -> bool {
    self.display_name.is_none()
      && self.email.is_none()
      && self.theme.is_none()
      && self.language.is_none()
      && self.voice.is_none()
  }
}
