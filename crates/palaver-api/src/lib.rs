//! JSON HTTP surface for Palaver.
//!
//! Exposes an axum [`Router`] implementing the account, conversation, and
//! chat-proxy endpoints, backed by any [`ChatStore`]. Page rendering and
//! static assets are the caller's responsibility.

pub mod accounts;
pub mod auth;
pub mod chat;
pub mod conversations;
pub mod error;

pub use error::ApiError;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post, put},
};
use palaver_core::store::ChatStore;
use palaver_upstream::UpstreamClient;
use serde::Deserialize;

// ─── Configuration ───────────────────────────────────────────────────────────

fn default_upstream_url() -> String {
  palaver_upstream::DEFAULT_BASE_URL.to_string()
}

/// Runtime server configuration, deserialised from `config.toml` and
/// `PALAVER_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:             String,
  pub port:             u16,
  pub store_path:       PathBuf,
  pub upstream_api_key: String,
  #[serde(default = "default_upstream_url")]
  pub upstream_url:     String,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
///
/// The store and upstream client are constructed once at startup and
/// injected here; handlers never reach for ambient globals.
pub struct AppState<S: ChatStore> {
  pub store:    Arc<S>,
  pub upstream: Arc<UpstreamClient>,
}

// Manual impl: cloning the state only clones the two Arcs, so the store
// itself does not need to be Clone.
impl<S: ChatStore> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), upstream: self.upstream.clone() }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the axum [`Router`] for the JSON API.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: ChatStore + 'static,
{
  Router::new()
    .route("/api/register", post(accounts::register::<S>))
    .route("/api/login", post(accounts::login::<S>))
    .route("/api/logout", post(accounts::logout::<S>))
    .route("/api/update_profile", put(accounts::update_profile::<S>))
    .route("/api/all_sessions", get(conversations::all_sessions::<S>))
    .route("/api/new_chat_session", post(conversations::new_chat_session::<S>))
    .route("/api/history/{session_id}", get(conversations::history::<S>))
    .route("/api/chat", post(chat::handler::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
