//! The shared error taxonomy for store operations.
//!
//! [`store::ChatStore`](crate::store::ChatStore) methods return this type
//! directly (rather than a backend-specific associated error), so HTTP
//! handlers generic over the store can map `Conflict` to 409 and `NotFound`
//! to 404 without knowing which backend raised them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed or missing caller input (empty message content, empty
  /// profile update).
  #[error("invalid argument: {0}")]
  InvalidArgument(String),

  /// The entity is absent, or exists but is not owned by the caller.
  /// The two cases are intentionally merged so an error shape never
  /// leaks the existence of another user's data.
  #[error("not found: {0}")]
  NotFound(String),

  /// Duplicate unique key (one user per email).
  #[error("conflict: {0}")]
  Conflict(String),

  /// The persistence layer is unreachable.
  #[error("store unavailable: {0}")]
  Unavailable(String),

  /// Unexpected backend failure.
  #[error("store error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
