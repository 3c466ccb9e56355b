//! Facade joining the pool and the session table
//!
//! The HTTP layer talks only to the broker. It owns the ordering rule that
//! keeps sessions consistent with the pool: after a mutation is installed
//! and persisted, every session binding is moved onto the new set. Bulk
//! refreshes are single-flight; a caller arriving while one is running waits
//! for it and gets that pass's result, error included, instead of starting
//! another pass.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::pool::{Change, RefreshStatus, TokenPool};
use crate::session::SessionTable;

pub struct TokenBroker {
    pool: Arc<TokenPool>,
    sessions: SessionTable,
    /// Held for the length of a bulk refresh. Holds the result of the last
    /// pass that ran to completion, or `None` while a pass is running.
    refresh_gate: Mutex<Option<Result<RefreshStatus>>>,
}

impl TokenBroker {
    pub fn new(pool: Arc<TokenPool>) -> Self {
        let sessions = SessionTable::new(pool.clone());
        Self::with_sessions(pool, sessions)
    }

    /// Use a session table built by the caller (e.g. with a custom timeout).
    pub fn with_sessions(pool: Arc<TokenPool>, sessions: SessionTable) -> Self {
        Self {
            pool,
            sessions,
            refresh_gate: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &Arc<TokenPool> {
        &self.pool
    }

    /// Sticky token for a session. Fails only with `EmptyPool`.
    pub async fn token_for_session(&self, session_id: &str) -> Result<String> {
        self.sessions.get(session_id).await
    }

    pub async fn add_token(&self, token: String) -> Result<Change> {
        let change = self.pool.add_token(token).await?;
        if change != Change::Unchanged {
            self.propagate().await;
        }
        Ok(change)
    }

    pub async fn update_token(&self, old: &str, new: String) -> Result<Change> {
        let change = self.pool.update_token(old, new).await?;
        if change != Change::Unchanged {
            self.propagate().await;
        }
        Ok(change)
    }

    /// Run a bulk refresh now, or wait for the one already running and share
    /// its result.
    pub async fn force_refresh_all(&self) -> Result<RefreshStatus> {
        let mut last = match self.refresh_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                info!("bulk refresh already in progress, waiting for it");
                let gate = self.refresh_gate.lock().await;
                if let Some(result) = gate.as_ref() {
                    return result.clone();
                }
                // The running pass was dropped before it finished.
                gate
            }
        };

        *last = None;
        let result = self.run_refresh().await;
        *last = Some(result.clone());
        result
    }

    async fn run_refresh(&self) -> Result<RefreshStatus> {
        let outcome = self.pool.bulk_refresh().await?;
        if outcome.propagate {
            self.propagate().await;
        }
        Ok(outcome.status)
    }

    pub async fn status(&self) -> Option<RefreshStatus> {
        self.pool.status().await
    }

    pub async fn token_count(&self) -> usize {
        self.pool.count().await
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.len().await
    }

    /// Drop idle sessions. Returns how many were removed.
    pub async fn sweep_sessions(&self) -> usize {
        self.sessions.sweep().await
    }

    async fn propagate(&self) {
        match self.sessions.rebind_all().await {
            Ok(0) => {}
            Ok(n) => info!(sessions = n, "sessions rebound to updated pool"),
            Err(e) => warn!(error = %e, "could not rebind sessions"),
        }
    }
}
