//! Hailuo token renewal and token storage
//!
//! The two leaves of the credential lifecycle: the renewal client that trades
//! an old provider token for a new one, and the store that keeps the token
//! list on disk between restarts. Neither holds policy; the pool crate decides
//! when to renew and what to persist.
//!
//! Renewal flow:
//! 1. Pool snapshots its token list
//! 2. `renewal::TokenRenewer::renew()` is called once per token, sequentially
//! 3. Pool installs the results and hands the full list to `store::TokenStore::save()`

pub mod constants;
pub mod error;
pub mod renewal;
pub mod store;

pub use constants::*;
pub use error::{Error, Result};
pub use renewal::{RenewalClient, TokenRenewer, correlation_id, device_id, renew_token};
pub use store::{FileTokenStore, StoreLoad, TokenStore};
