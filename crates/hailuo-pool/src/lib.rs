//! Token pool for the Hailuo gateway
//!
//! Keeps a set of provider tokens alive and hands them out to callers with
//! per-session stickiness. The pool reads and writes its list through a
//! `TokenStore` and renews tokens through a `TokenRenewer`, both from
//! `hailuo-auth`.
//!
//! Token lifecycle:
//! 1. At startup the pool loads the store, or falls back to the bootstrap list
//!    and writes it back
//! 2. Callers ask the broker for a token per session → sticky binding,
//!    round-robin allocation for new sessions
//! 3. The scheduler runs a bulk refresh at startup and then every interval;
//!    failed renewals keep their old token
//! 4. After a refreshed set is persisted, every session is moved onto it
//! 5. Sessions idle for 30 minutes are swept every 5 minutes

pub mod broker;
pub mod error;
pub mod pool;
pub mod refresh;
pub mod session;

#[cfg(test)]
mod testing;

pub use broker::TokenBroker;
pub use error::{Error, Result};
pub use pool::{Change, PoolOrigin, RefreshOutcome, RefreshStatus, TokenPool, TokenSet};
pub use refresh::{DEFAULT_REFRESH_INTERVAL, RefreshScheduler, SWEEP_INTERVAL};
pub use session::{SESSION_TIMEOUT, SessionTable, resolve_session_id, synthesize_session_id};
