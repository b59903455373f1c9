//! Error type for `palaver-upstream`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The upstream call exceeded the configured timeout. Surfaced as 504;
  /// the call is never retried automatically.
  #[error("upstream API request timed out")]
  Timeout,

  /// Connection or protocol failure before a status line arrived.
  #[error("error connecting to upstream API: {0}")]
  Transport(#[source] reqwest::Error),

  /// Upstream answered with a non-success status. The status is passed
  /// through to the caller of /api/chat.
  #[error("upstream API returned status {status}: {body}")]
  Status { status: u16, body: String },

  #[error("invalid upstream client configuration: {0}")]
  Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
