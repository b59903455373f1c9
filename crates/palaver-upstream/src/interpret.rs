//! Interpretation of an upstream response body.
//!
//! The body is examined in strict priority order: a usable candidate
//! beats a block reason, a block reason beats an explicit error object,
//! and anything else falls back to a generic failure string. The order
//! matters because the interpreted text determines what gets persisted
//! as the model's turn and what the browser shows.

use serde_json::Value;

/// Generic failure text when the body matches none of the known shapes.
/// A reply equal to this constant is never persisted.
pub const FALLBACK_REPLY: &str = "Error: Could not get a response.";

/// The interpreted outcome of one upstream call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
  /// A candidate with extractable text.
  Candidate(String),
  /// The prompt was blocked; holds the upstream block reason.
  Blocked(String),
  /// The body carried an explicit error object; holds its message.
  UpstreamError(String),
  /// None of the known shapes matched.
  Unusable,
}

impl Reply {
  /// The user-facing text for this outcome.
  pub fn into_text(self) -> String {
    match self {
      Reply::Candidate(text) => text,
      Reply::Blocked(reason) => {
        format!("Sorry, your request was blocked due to: {reason}.")
      }
      Reply::UpstreamError(message) => {
        format!("Upstream API error: {message}")
      }
      Reply::Unusable => FALLBACK_REPLY.to_string(),
    }
  }

  /// Whether this outcome should be stored as a model turn. Block and
  /// error explanations are persisted (the user saw them); the generic
  /// fallback is noise and is not.
  pub fn is_persistable(&self) -> bool {
    match self {
      Reply::Unusable => false,
      Reply::Candidate(text) => !text.trim().is_empty(),
      Reply::Blocked(_) | Reply::UpstreamError(_) => true,
    }
  }
}

/// Classify a response body. See the module docs for the priority order.
pub fn interpret(body: &Value) -> Reply {
  if let Some(text) = body
    .pointer("/candidates/0/content/parts/0/text")
    .and_then(Value::as_str)
  {
    return Reply::Candidate(text.to_string());
  }

  if let Some(reason) = body
    .pointer("/promptFeedback/blockReason")
    .and_then(Value::as_str)
  {
    return Reply::Blocked(reason.to_string());
  }

  if let Some(message) = body.pointer("/error/message").and_then(Value::as_str) {
    return Reply::UpstreamError(message.to_string());
  }

  Reply::Unusable
}
