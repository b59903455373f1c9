//! Core types and trait definitions for the Palaver chat backend.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

pub mod conversation;
pub mod error;
pub mod store;
pub mod user;

pub use error::{Error, Result};
