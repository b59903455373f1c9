//! Wire types for the generative-language request payload.
//!
//! Field names are camelCase on the wire (`inlineData`, `mimeType`),
//! matching what the browser client already sends.

use serde::{Deserialize, Serialize};

/// One conversation turn as the upstream API expects it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
  pub role:  String,
  pub parts: Vec<Part>,
}

/// A part of a turn: text, inline binary data, or (from lenient clients)
/// neither.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub text:        Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub inline_data: Option<InlineData>,
}

impl Part {
  pub fn text(s: impl Into<String>) -> Self {
    Part { text: Some(s.into()), inline_data: None }
  }
}

/// Base64-encoded binary payload with its declared media type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
  pub mime_type: String,
  pub data:      String,
}

impl Content {
  pub fn user_text(s: impl Into<String>) -> Self {
    Content { role: "user".into(), parts: vec![Part::text(s)] }
  }
}
