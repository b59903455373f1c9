//! The `ChatStore` trait.
//!
//! Implemented by storage backends (e.g. `palaver-store-sqlite`). The API
//! layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  Result,
  conversation::{ChatSession, Message, NewMessage, SessionSummary},
  user::{FederatedProfile, NewLocalUser, ProfileUpdate, User, UserRef},
};

/// Abstraction over the identity, login-session, and conversation stores.
///
/// Methods return the shared [`Error`](crate::Error) taxonomy so generic
/// HTTP handlers can translate `Conflict`/`NotFound` into status codes.
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`). Parameters are
/// taken by value: the returned future borrows nothing but `self`, so it
/// can be spawned or held across awaits freely.
pub trait ChatStore: Send + Sync {
  // ── Users ─────────────────────────────────────────────────────────────

  /// Find-or-create a user by federated subject id. Idempotent: a repeat
  /// call refreshes display name, picture, and last-login instead of
  /// erroring. Never touches local-login fields.
  fn upsert_federated_user(
    &self,
    profile: FederatedProfile,
  ) -> impl Future<Output = Result<User>> + Send + '_;

  /// Create a local-login user with default settings. Fails with
  /// [`Error::Conflict`](crate::Error::Conflict) if the email is taken —
  /// including by a federated account, since linking is out of scope.
  fn create_local_user(
    &self,
    input: NewLocalUser,
  ) -> impl Future<Output = Result<User>> + Send + '_;

  /// Look up by email. `Ok(None)` for an unknown email, never an error.
  fn find_by_email(
    &self,
    email: String,
  ) -> impl Future<Output = Result<Option<User>>> + Send + '_;

  /// Look up by reference. `Ok(None)` for an unknown ref, never an error.
  fn find_by_ref(
    &self,
    user: UserRef,
  ) -> impl Future<Output = Result<Option<User>>> + Send + '_;

  /// Bump `last_login` to now. No-op for an unknown ref.
  fn touch_last_login(
    &self,
    user: UserRef,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Apply the populated fields of `update` atomically and return the
  /// fresh record. An empty update is `InvalidArgument`; an unknown ref
  /// is `NotFound`; changing the email to one another user holds is
  /// `Conflict`, with no fields applied.
  fn update_profile(
    &self,
    user: UserRef,
    update: ProfileUpdate,
  ) -> impl Future<Output = Result<User>> + Send + '_;

  // ── Login sessions ────────────────────────────────────────────────────

  /// Record a login session keyed by the digest of an opaque token.
  /// Only the digest ever reaches the store.
  fn open_login_session(
    &self,
    user: UserRef,
    token_hash: String,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  /// Resolve a token digest back to its user. `Ok(None)` for an unknown,
  /// logged-out, or expired token.
  fn resolve_login_session(
    &self,
    token_hash: String,
  ) -> impl Future<Output = Result<Option<UserRef>>> + Send + '_;

  /// Delete a login session. No-op if the token digest is unknown.
  fn close_login_session(
    &self,
    token_hash: String,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  // ── Chat sessions ─────────────────────────────────────────────────────

  /// Create a session owned by `user`, titled with the placeholder and
  /// both timestamps set to now.
  fn create_chat_session(
    &self,
    user: UserRef,
  ) -> impl Future<Output = Result<ChatSession>> + Send + '_;

  /// All of `user`'s sessions, most recently updated first. Sessions
  /// still carrying the placeholder title get one lazily derived from
  /// their first user message and persisted, so later calls skip the
  /// derivation. Derivation does not bump `last_updated`.
  fn list_chat_sessions(
    &self,
    user: UserRef,
  ) -> impl Future<Output = Result<Vec<SessionSummary>>> + Send + '_;

  /// Bump `last_updated` to now. Fails with `NotFound` unless the
  /// session exists and is owned by `user` — ownership is enforced
  /// before any mutation.
  fn touch_chat_session(
    &self,
    session_id: Uuid,
    user: UserRef,
  ) -> impl Future<Output = Result<()>> + Send + '_;

  // ── Messages ──────────────────────────────────────────────────────────

  /// Append one turn with a store-assigned timestamp. Content is trimmed
  /// first; empty-after-trim is `InvalidArgument`.
  fn append_message(
    &self,
    input: NewMessage,
  ) -> impl Future<Output = Result<Message>> + Send + '_;

  /// All messages of a session in ascending timestamp order. Fails with
  /// `NotFound` unless the session exists and is owned by `user`; the
  /// ownership check runs before any message lookup so the error shape
  /// never reveals another user's session.
  fn get_history(
    &self,
    session_id: Uuid,
    user: UserRef,
  ) -> impl Future<Output = Result<Vec<Message>>> + Send + '_;
}
