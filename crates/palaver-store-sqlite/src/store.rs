//! [`SqliteStore`] — the SQLite implementation of [`ChatStore`].

use std::path::Path;

use chrono::{Duration, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use palaver_core::{
  conversation::{
    ChatSession, Message, NewMessage, PLACEHOLDER_TITLE, SessionSummary,
    derive_title,
  },
  store::ChatStore,
  user::{FederatedProfile, NewLocalUser, ProfileUpdate, User, UserRef},
};

use crate::{
  Error,
  encode::{RawMessage, RawUser, encode_dt, encode_role, encode_uuid},
  schema::SCHEMA,
};

type CoreResult<T> = palaver_core::Result<T>;

/// Login sessions older than this are treated as expired and deleted on
/// the next resolve or login.
const LOGIN_SESSION_TTL_DAYS: i64 = 30;

/// Map a database-layer failure into the shared taxonomy.
fn db_err(e: tokio_rusqlite::Error) -> palaver_core::Error {
  Error::Database(e).into()
}

/// Map a unique-key violation to `Conflict`, anything else through
/// [`db_err`].
fn conflict_err(e: tokio_rusqlite::Error, message: &str) -> palaver_core::Error {
  match &e {
    tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(f, _))
      if f.code == rusqlite::ErrorCode::ConstraintViolation =>
    {
      palaver_core::Error::Conflict(message.to_string())
    }
    _ => db_err(e),
  }
}

const USER_COLUMNS: &str = "user_ref, email, display_name, provider_id, \
                            picture_url, password_hash, last_login, theme, \
                            language, voice";

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawUser> {
  Ok(RawUser {
    user_ref:      row.get(0)?,
    email:         row.get(1)?,
    display_name:  row.get(2)?,
    provider_id:   row.get(3)?,
    picture_url:   row.get(4)?,
    password_hash: row.get(5)?,
    last_login:    row.get(6)?,
    theme:         row.get(7)?,
    language:      row.get(8)?,
    voice:         row.get(9)?,
  })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Palaver chat store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted. The
/// connection is opened once at startup and shared by every request
/// worker; `tokio_rusqlite` serialises access on its own thread.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> crate::Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> crate::Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> crate::Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch a user row by its encoded ref.
  async fn fetch_user(&self, ref_str: String) -> CoreResult<Option<User>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {USER_COLUMNS} FROM users WHERE user_ref = ?1"),
              rusqlite::params![ref_str],
              user_from_row,
            )
            .optional()?,
        )
      })
      .await
      .map_err(db_err)?;

    raw.map(RawUser::into_user).transpose()
  }
}

// ─── ChatStore impl ──────────────────────────────────────────────────────────

impl ChatStore for SqliteStore {
  // ── Users ─────────────────────────────────────────────────────────────────

  async fn upsert_federated_user(
    &self,
    profile: FederatedProfile,
  ) -> CoreResult<User> {
    let user_ref = UserRef::Federated(profile.subject_id.clone());
    let ref_str  = user_ref.encode();
    let now_str  = encode_dt(Utc::now());

    let ref_for_insert = ref_str.clone();
    self
      .conn
      .call(move |conn| {
        let exists: bool = conn
          .query_row(
            "SELECT 1 FROM users WHERE provider_id = ?1",
            rusqlite::params![profile.subject_id],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if exists {
          conn.execute(
            "UPDATE users
             SET display_name = ?1, picture_url = ?2, last_login = ?3
             WHERE provider_id = ?4",
            rusqlite::params![
              profile.display_name,
              profile.picture_url,
              now_str,
              profile.subject_id,
            ],
          )?;
        } else {
          conn.execute(
            "INSERT INTO users (user_ref, email, display_name, provider_id,
                                picture_url, password_hash, last_login)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6)",
            rusqlite::params![
              ref_for_insert,
              profile.email,
              profile.display_name,
              profile.subject_id,
              profile.picture_url,
              now_str,
            ],
          )?;
        }
        Ok(())
      })
      .await
      .map_err(db_err)?;

    self
      .fetch_user(ref_str)
      .await?
      .ok_or_else(|| palaver_core::Error::NotFound("user vanished after upsert".into()))
  }

  async fn create_local_user(&self, input: NewLocalUser) -> CoreResult<User> {
    let user_ref = UserRef::Local(Uuid::new_v4());
    let ref_str  = user_ref.encode();
    let now_str  = encode_dt(Utc::now());
    let email    = input.email.clone();

    let ref_for_insert = ref_str.clone();
    let inserted: bool = self
      .conn
      .call(move |conn| {
        // Pre-check keeps the common duplicate path off the constraint
        // error; the UNIQUE index still backstops the race.
        let taken: bool = conn
          .query_row(
            "SELECT 1 FROM users WHERE email = ?1",
            rusqlite::params![input.email],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(false);
        }

        conn.execute(
          "INSERT INTO users (user_ref, email, display_name, provider_id,
                              picture_url, password_hash, last_login)
           VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?5)",
          rusqlite::params![
            ref_for_insert,
            input.email,
            input.display_name,
            input.password_hash,
            now_str,
          ],
        )?;
        Ok(true)
      })
      .await
      .map_err(|e| conflict_err(e, "user with this email already exists"))?;

    if !inserted {
      return Err(palaver_core::Error::Conflict(format!(
        "user with email {email:?} already exists"
      )));
    }

    self
      .fetch_user(ref_str)
      .await?
      .ok_or_else(|| palaver_core::Error::NotFound("user vanished after insert".into()))
  }

  async fn find_by_email(&self, email: String) -> CoreResult<Option<User>> {
    let raw: Option<RawUser> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
              rusqlite::params![email],
              user_from_row,
            )
            .optional()?,
        )
      })
      .await
      .map_err(db_err)?;

    raw.map(RawUser::into_user).transpose()
  }

  async fn find_by_ref(&self, user: UserRef) -> CoreResult<Option<User>> {
    self.fetch_user(user.encode()).await
  }

  async fn touch_last_login(&self, user: UserRef) -> CoreResult<()> {
    let ref_str = user.encode();
    let now_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE users SET last_login = ?1 WHERE user_ref = ?2",
          rusqlite::params![now_str, ref_str],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)
  }

  async fn update_profile(
    &self,
    user: UserRef,
    update: ProfileUpdate,
  ) -> CoreResult<User> {
    if update.is_empty() {
      return Err(palaver_core::Error::InvalidArgument(
        "no fields to update".into(),
      ));
    }

    let ref_str = user.encode();
    let ref_for_update = ref_str.clone();
    let updated: usize = self
      .conn
      .call(move |conn| {
        // One statement for all populated fields: a constraint violation
        // (duplicate email) leaves every field untouched.
        let mut assignments: Vec<String> = Vec::new();
        let mut values: Vec<String> = Vec::new();
        let fields = [
          ("display_name", update.display_name),
          ("email", update.email),
          ("theme", update.theme),
          ("language", update.language),
          ("voice", update.voice),
        ];
        for (column, value) in fields {
          if let Some(v) = value {
            values.push(v);
            assignments.push(format!("{column} = ?{}", values.len()));
          }
        }
        values.push(ref_for_update);
        let sql = format!(
          "UPDATE users SET {} WHERE user_ref = ?{}",
          assignments.join(", "),
          values.len(),
        );

        Ok(conn.execute(&sql, rusqlite::params_from_iter(values))?)
      })
      .await
      .map_err(|e| conflict_err(e, "email already in use"))?;

    if updated == 0 {
      return Err(palaver_core::Error::NotFound(format!(
        "user {user} not found"
      )));
    }

    self
      .fetch_user(ref_str)
      .await?
      .ok_or_else(|| palaver_core::Error::NotFound(format!("user {user} not found")))
  }

  // ── Login sessions ────────────────────────────────────────────────────────

  async fn open_login_session(
    &self,
    user: UserRef,
    token_hash: String,
  ) -> CoreResult<()> {
    let ref_str    = user.encode();
    let now_str    = encode_dt(Utc::now());
    let cutoff_str = expiry_cutoff();
    self
      .conn
      .call(move |conn| {
        // Each login also sweeps out expired rows, so the table stays
        // bounded by the active-session count.
        conn.execute(
          "DELETE FROM login_sessions WHERE created_at < ?1",
          rusqlite::params![cutoff_str],
        )?;
        conn.execute(
          "INSERT OR REPLACE INTO login_sessions (token_hash, user_ref, created_at)
           VALUES (?1, ?2, ?3)",
          rusqlite::params![token_hash, ref_str, now_str],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)
  }

  async fn resolve_login_session(
    &self,
    token_hash: String,
  ) -> CoreResult<Option<UserRef>> {
    let cutoff_str = expiry_cutoff();
    let ref_str: Option<String> = self
      .conn
      .call(move |conn| {
        let row: Option<(String, String)> = conn
          .query_row(
            "SELECT user_ref, created_at FROM login_sessions WHERE token_hash = ?1",
            rusqlite::params![token_hash],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;

        match row {
          // Fixed-width timestamp encoding: string comparison is
          // chronological comparison.
          Some((_, created_at)) if created_at < cutoff_str => {
            conn.execute(
              "DELETE FROM login_sessions WHERE token_hash = ?1",
              rusqlite::params![token_hash],
            )?;
            Ok(None)
          }
          Some((user_ref, _)) => Ok(Some(user_ref)),
          None => Ok(None),
        }
      })
      .await
      .map_err(db_err)?;

    ref_str.map(|s| UserRef::decode(&s)).transpose()
  }

  async fn close_login_session(&self, token_hash: String) -> CoreResult<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM login_sessions WHERE token_hash = ?1",
          rusqlite::params![token_hash],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)
  }

  // ── Chat sessions ─────────────────────────────────────────────────────────

  async fn create_chat_session(&self, user: UserRef) -> CoreResult<ChatSession> {
    let session = ChatSession {
      session_id:   Uuid::new_v4(),
      owner:        user,
      created_at:   Utc::now(),
      last_updated: Utc::now(),
      title:        PLACEHOLDER_TITLE.to_string(),
    };

    let id_str      = encode_uuid(session.session_id);
    let ref_str     = session.owner.encode();
    let created_str = encode_dt(session.created_at);
    let updated_str = encode_dt(session.last_updated);
    let title       = session.title.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO chat_sessions (session_id, user_ref, created_at,
                                      last_updated, title)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, ref_str, created_str, updated_str, title],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)?;

    Ok(session)
  }

  async fn list_chat_sessions(
    &self,
    user: UserRef,
  ) -> CoreResult<Vec<SessionSummary>> {
    let ref_str = user.encode();

    let rows: Vec<(String, String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT session_id, title, last_updated
           FROM chat_sessions
           WHERE user_ref = ?1
           ORDER BY last_updated DESC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![ref_str], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await
      .map_err(db_err)?;

    let mut summaries = Vec::with_capacity(rows.len());
    for (id_str, title, updated_str) in rows {
      let title = if title == PLACEHOLDER_TITLE {
        self.derive_and_store_title(id_str.clone()).await?
      } else {
        title
      };

      summaries.push(SessionSummary {
        session_id:   crate::encode::decode_uuid(&id_str)?,
        title,
        last_updated: crate::encode::decode_dt(&updated_str)?,
      });
    }

    Ok(summaries)
  }

  async fn touch_chat_session(
    &self,
    session_id: Uuid,
    user: UserRef,
  ) -> CoreResult<()> {
    let id_str  = encode_uuid(session_id);
    let ref_str = user.encode();
    let now_str = encode_dt(Utc::now());

    let updated: usize = self
      .conn
      .call(move |conn| {
        // Owner match is part of the WHERE clause: the bump never happens
        // for a session the caller does not own.
        Ok(conn.execute(
          "UPDATE chat_sessions SET last_updated = ?1
           WHERE session_id = ?2 AND user_ref = ?3",
          rusqlite::params![now_str, id_str, ref_str],
        )?)
      })
      .await
      .map_err(db_err)?;

    if updated == 0 {
      return Err(palaver_core::Error::NotFound(format!(
        "chat session {session_id} not found"
      )));
    }
    Ok(())
  }

  // ── Messages ──────────────────────────────────────────────────────────────

  async fn append_message(&self, input: NewMessage) -> CoreResult<Message> {
    let content = input.content.trim().to_string();
    if content.is_empty() {
      return Err(palaver_core::Error::InvalidArgument(
        "message content is empty".into(),
      ));
    }

    let message = Message {
      message_id:   Uuid::new_v4(),
      session_id:   input.session_id,
      owner:        input.owner,
      role:         input.role,
      content,
      created_at:   Utc::now(),
      content_type: "text".to_string(),
    };

    let id_str      = encode_uuid(message.message_id);
    let session_str = encode_uuid(message.session_id);
    let ref_str     = message.owner.encode();
    let role_str    = encode_role(message.role).to_owned();
    let content_str = message.content.clone();
    let at_str      = encode_dt(message.created_at);
    let type_str    = message.content_type.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO messages (message_id, session_id, user_ref, role,
                                 content, created_at, content_type)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            session_str,
            ref_str,
            role_str,
            content_str,
            at_str,
            type_str,
          ],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)?;

    Ok(message)
  }

  async fn get_history(
    &self,
    session_id: Uuid,
    user: UserRef,
  ) -> CoreResult<Vec<Message>> {
    let id_str  = encode_uuid(session_id);
    let ref_str = user.encode();

    let raws: Option<Vec<RawMessage>> = self
      .conn
      .call(move |conn| {
        // Ownership check first; message lookup never runs for a session
        // the caller does not own, so the error shape is uniform.
        let owned: bool = conn
          .query_row(
            "SELECT 1 FROM chat_sessions WHERE session_id = ?1 AND user_ref = ?2",
            rusqlite::params![id_str, ref_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if !owned {
          return Ok(None);
        }

        let mut stmt = conn.prepare(
          "SELECT message_id, session_id, user_ref, role, content,
                  created_at, content_type
           FROM messages
           WHERE session_id = ?1
           ORDER BY created_at ASC, rowid ASC",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawMessage {
              message_id:   row.get(0)?,
              session_id:   row.get(1)?,
              user_ref:     row.get(2)?,
              role:         row.get(3)?,
              content:      row.get(4)?,
              created_at:   row.get(5)?,
              content_type: row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(rows))
      })
      .await
      .map_err(db_err)?;

    let raws = raws.ok_or_else(|| {
      palaver_core::Error::NotFound(format!("chat session {session_id} not found"))
    })?;

    raws.into_iter().map(RawMessage::into_message).collect()
  }
}

/// Encoded timestamp below which a login session counts as expired.
fn expiry_cutoff() -> String {
  encode_dt(Utc::now() - Duration::days(LOGIN_SESSION_TTL_DAYS))
}

impl SqliteStore {
  /// Derive and persist a title for a placeholder-titled session from its
  /// first user message. Leaves the placeholder when no user message
  /// exists yet. The UPDATE does not bump `last_updated`, and re-deriving
  /// writes the same value, so the operation is idempotent under races.
  async fn derive_and_store_title(&self, id_str: String) -> CoreResult<String> {
    let id_for_select = id_str.clone();
    self
      .conn
      .call(move |conn| {
        let first: Option<String> = conn
          .query_row(
            "SELECT content FROM messages
             WHERE session_id = ?1 AND role = 'user'
             ORDER BY created_at ASC, rowid ASC
             LIMIT 1",
            rusqlite::params![id_for_select],
            |r| r.get(0),
          )
          .optional()?;

        match first {
          Some(content) => {
            let derived = derive_title(&content);
            conn.execute(
              "UPDATE chat_sessions SET title = ?1 WHERE session_id = ?2",
              rusqlite::params![derived, id_str],
            )?;
            Ok(derived)
          }
          None => Ok(PLACEHOLDER_TITLE.to_string()),
        }
      })
      .await
      .map_err(db_err)
  }

  /// Rewrite a login session's `created_at`, so tests can age a session
  /// past the expiry cutoff without a clock.
  #[cfg(test)]
  pub(crate) async fn backdate_login_session(
    &self,
    token_hash: &str,
    days_ago: i64,
  ) -> CoreResult<()> {
    let hash = token_hash.to_owned();
    let at_str = encode_dt(Utc::now() - Duration::days(days_ago));
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE login_sessions SET created_at = ?1 WHERE token_hash = ?2",
          rusqlite::params![at_str, hash],
        )?;
        Ok(())
      })
      .await
      .map_err(db_err)
  }
}
