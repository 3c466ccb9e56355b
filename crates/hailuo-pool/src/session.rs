//! Session affinity: sticky token per conversation
//!
//! A session keeps the token it was first given for as long as it keeps
//! coming back and the token is still in the pool. Idle bindings are dropped
//! by a periodic sweep rather than on lookup, so `get` stays a single map lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::Result;
use crate::pool::TokenPool;

/// Idle time after which a binding is swept.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug)]
struct SessionBinding {
    token: String,
    last_access: Instant,
}

/// Session id used when the caller supplies none: `temp_<unix millis>`.
pub fn synthesize_session_id() -> String {
    format!("temp_{}", Utc::now().timestamp_millis())
}

/// Use the caller's conversation id, or synthesize one.
pub fn resolve_session_id(conversation_id: Option<&str>) -> String {
    match conversation_id {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => synthesize_session_id(),
    }
}

/// Maps session ids to tokens drawn from the pool.
///
/// `get`, `sweep` and `rebind_all` all run under the same lock, so a session
/// is never handed a binding that a concurrent rebind is replacing.
pub struct SessionTable {
    pool: Arc<TokenPool>,
    bindings: Mutex<HashMap<String, SessionBinding>>,
    timeout: Duration,
}

impl SessionTable {
    pub fn new(pool: Arc<TokenPool>) -> Self {
        Self::with_timeout(pool, SESSION_TIMEOUT)
    }

    pub fn with_timeout(pool: Arc<TokenPool>, timeout: Duration) -> Self {
        Self {
            pool,
            bindings: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Token for `session_id`, binding a fresh one on first use.
    ///
    /// A binding whose token has left the pool is treated as absent.
    pub async fn get(&self, session_id: &str) -> Result<String> {
        let mut bindings = self.bindings.lock().await;

        if let Some(binding) = bindings.get_mut(session_id) {
            if self.pool.contains(&binding.token).await {
                binding.last_access = Instant::now();
                return Ok(binding.token.clone());
            }
            debug!(session_id, "bound token left the pool, rebinding session");
        }

        let token = self.pool.next().await?;
        bindings.insert(
            session_id.to_string(),
            SessionBinding {
                token: token.clone(),
                last_access: Instant::now(),
            },
        );
        metrics::gauge!("session_bindings").set(bindings.len() as f64);
        debug!(session_id, "session bound to token");
        Ok(token)
    }

    /// Drop every binding idle for longer than the session timeout.
    /// Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let mut bindings = self.bindings.lock().await;
        let now = Instant::now();
        let before = bindings.len();
        bindings.retain(|_, b| now.duration_since(b.last_access) <= self.timeout);
        let removed = before - bindings.len();
        metrics::gauge!("session_bindings").set(bindings.len() as f64);
        if removed > 0 {
            info!(removed, remaining = bindings.len(), "expired sessions swept");
        }
        removed
    }

    /// Point every binding at a freshly selected token. Called after the
    /// pool installs and persists a refreshed set. Last-access times are
    /// left alone so rebinding does not keep idle sessions alive.
    pub async fn rebind_all(&self) -> Result<usize> {
        let mut bindings = self.bindings.lock().await;
        for binding in bindings.values_mut() {
            binding.token = self.pool.next().await?;
        }
        Ok(bindings.len())
    }

    pub async fn len(&self) -> usize {
        self.bindings.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
