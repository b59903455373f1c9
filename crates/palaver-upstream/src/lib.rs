//! HTTP client and response interpreter for the third-party
//! generative-language API.
//!
//! The API is treated as an opaque collaborator: one POST per chat turn,
//! a bounded timeout, no automatic retry (a retry could double-bill the
//! upstream call and store a duplicate reply), and the response body kept
//! verbatim for the browser client to render.

mod client;
mod interpret;
mod types;

pub mod error;

pub use client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, UpstreamClient};
pub use error::{Error, Result};
pub use interpret::{FALLBACK_REPLY, Reply, interpret};
pub use types::{Content, InlineData, Part};
