//! [`UpstreamClient`] — thin reqwest wrapper around the generate endpoint.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::{Error, Result, types::Content};

/// Production endpoint for the generative-language API.
pub const DEFAULT_BASE_URL: &str =
  "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

/// Deadline for one upstream call; beyond it the request fails rather
/// than hangs.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Client for the upstream generate endpoint (HTTP direct, no SDK).
///
/// Cloning is cheap — the inner `reqwest::Client` is reference-counted
/// and its connection pool is shared by all request workers.
#[derive(Clone)]
pub struct UpstreamClient {
  http:     reqwest::Client,
  base_url: String,
  api_key:  String,
  timeout:  Duration,
}

impl UpstreamClient {
  /// Build a client against the production endpoint with the default
  /// 20-second timeout.
  pub fn new(api_key: impl Into<String>) -> Result<Self> {
    Self::with_endpoint(DEFAULT_BASE_URL, api_key, DEFAULT_TIMEOUT)
  }

  /// Build a client against an arbitrary endpoint — used by tests to
  /// point at a stub server, and by config to override the model.
  pub fn with_endpoint(
    base_url: impl Into<String>,
    api_key: impl Into<String>,
    timeout: Duration,
  ) -> Result<Self> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .build()
      .map_err(|e| Error::Config(e.to_string()))?;

    Ok(Self {
      http,
      base_url: base_url.into(),
      api_key: api_key.into(),
      timeout,
    })
  }

  /// Issue one generate call and return the parsed response body
  /// verbatim. Exactly one attempt: timeouts and transport failures are
  /// surfaced, never retried.
  pub async fn generate(&self, contents: &[Content]) -> Result<Value> {
    let payload = serde_json::json!({ "contents": contents });

    let response = self
      .http
      .post(format!("{}?key={}", self.base_url, self.api_key))
      .timeout(self.timeout)
      .json(&payload)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          Error::Timeout
        } else {
          Error::Transport(e)
        }
      })?;

    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(Error::Status { status: status.as_u16(), body });
    }

    response.json::<Value>().await.map_err(|e| {
      if e.is_timeout() {
        Error::Timeout
      } else {
        Error::Transport(e)
      }
    })
  }
}
