//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error becomes a JSON body of the form `{"error": "<message>"}`;
//! stack traces and store internals never reach the caller.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  /// No valid login session accompanied the request.
  #[error("unauthenticated")]
  Unauthenticated,

  #[error("bad request: {0}")]
  InvalidArgument(String),

  /// Absent or not owned by the caller — deliberately indistinguishable.
  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("payload too large: {0}")]
  PayloadTooLarge(String),

  /// The upstream model API did not answer within the deadline.
  #[error("upstream API request timed out")]
  GatewayTimeout,

  /// Could not reach the upstream model API at all.
  #[error("upstream API unavailable: {0}")]
  UpstreamUnavailable(String),

  /// The upstream model API answered with an error status, mirrored back
  /// to the caller with a wrapped message.
  #[error("upstream API error (status {status}): {message}")]
  Upstream { status: u16, message: String },

  #[error("store unavailable: {0}")]
  StoreUnavailable(String),

  #[error("internal error: {0}")]
  Internal(String),
}

impl From<palaver_core::Error> for ApiError {
  fn from(e: palaver_core::Error) -> Self {
    use palaver_core::Error as E;
    match e {
      E::InvalidArgument(m) => ApiError::InvalidArgument(m),
      E::NotFound(m) => ApiError::NotFound(m),
      E::Conflict(m) => ApiError::Conflict(m),
      E::Unavailable(m) => ApiError::StoreUnavailable(m),
      E::Internal(inner) => ApiError::Internal(inner.to_string()),
    }
  }
}

impl From<palaver_upstream::Error> for ApiError {
  fn from(e: palaver_upstream::Error) -> Self {
    use palaver_upstream::Error as E;
    match e {
      E::Timeout => ApiError::GatewayTimeout,
      E::Transport(inner) => ApiError::UpstreamUnavailable(inner.to_string()),
      E::Status { status, body } => ApiError::Upstream {
        status,
        message: format!("error from upstream API: {body}"),
      },
      E::Config(m) => ApiError::Internal(m),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self {
      ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
      ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::Conflict(_) => StatusCode::CONFLICT,
      ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
      ApiError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
      ApiError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
      ApiError::Upstream { status, .. } => StatusCode::from_u16(*status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
      ApiError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
      ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
