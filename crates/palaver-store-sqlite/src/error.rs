//! Error type for `palaver-store-sqlite`, and its conversion into the
//! shared taxonomy the `ChatStore` trait exposes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown role encoding: {0:?}")]
  UnknownRole(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<Error> for palaver_core::Error {
  fn from(e: Error) -> Self {
    palaver_core::Error::Internal(Box::new(e))
  }
}
