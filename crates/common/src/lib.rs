//! Shared types for the Hailuo token gateway
//!
//! `Secret` wraps values that must never reach logs (the management API key),
//! `token_preview` gives log lines a stable handle on a provider token without
//! leaking it, and `Error` covers configuration loading.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::{Secret, token_preview};
