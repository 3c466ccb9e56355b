//! Token set, round-robin selection and bulk refresh
//!
//! The pool owns the in-memory token list. Selection walks it round-robin via
//! an `AtomicUsize` cursor under a read lock, so a caller sees either the
//! whole pre-refresh list or the whole post-refresh list, never a mix.
//!
//! Bulk refresh renews tokens one at a time without holding any lock, then
//! installs every result in a single write-lock section. A token whose
//! renewal fails stays in its slot, so the pool never shrinks because of a
//! refresh.
//!
//! Every mutation is followed by a save of the full list. A failed save is
//! reported to the caller but the in-memory list is kept as-is.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::token_preview;
use hailuo_auth::{StoreLoad, TokenRenewer, TokenStore};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Ordered, duplicate-free list of tokens.
#[derive(Debug, Default, Clone)]
pub struct TokenSet {
    order: Vec<String>,
    members: HashSet<String>,
}

/// Result of swapping one token for another inside a `TokenSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replace {
    Replaced,
    /// `old` was not in the set.
    Missing,
    /// `new` already occupies another slot.
    Duplicate,
}

impl TokenSet {
    /// Build a set, dropping repeated entries (first occurrence wins).
    pub fn from_tokens(tokens: impl IntoIterator<Item = String>) -> Self {
        let mut set = Self::default();
        for token in tokens {
            if !set.push(token) {
                warn!("dropping duplicate token from initial list");
            }
        }
        set
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.members.contains(token)
    }

    pub fn get(&self, index: usize) -> Option<&String> {
        self.order.get(index)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.order
    }

    /// Append `token` unless present. Returns whether it was added.
    pub fn push(&mut self, token: String) -> bool {
        if self.members.contains(&token) {
            return false;
        }
        self.members.insert(token.clone());
        self.order.push(token);
        true
    }

    /// Put `new` into the slot held by `old`.
    pub fn replace(&mut self, old: &str, new: String) -> Replace {
        let Some(index) = self.order.iter().position(|t| t == old) else {
            return Replace::Missing;
        };
        if old == new {
            return Replace::Replaced;
        }
        if self.members.contains(&new) {
            return Replace::Duplicate;
        }
        self.members.remove(old);
        self.members.insert(new.clone());
        self.order[index] = new;
        Replace::Replaced
    }

    /// Apply a batch of `(old, new)` swaps by position.
    ///
    /// Duplicates are judged against the resulting list, so a chain such as
    /// `a -> b, b -> b'` is accepted. A swapped-in value that matches an
    /// untouched slot, or an earlier swapped slot, is reverted and reported as
    /// `Duplicate`. Reverting puts the old value back, which can clash in
    /// turn, so this repeats until the list is clean.
    pub fn replace_all(&mut self, swaps: &[(&str, String)]) -> Vec<Replace> {
        let mut outcomes = vec![Replace::Missing; swaps.len()];
        let mut order = self.order.clone();
        let mut swap_at: Vec<Option<usize>> = vec![None; order.len()];

        for (i, (old, new)) in swaps.iter().enumerate() {
            if let Some(pos) = self.order.iter().position(|t| t == old) {
                order[pos] = new.clone();
                swap_at[pos] = Some(i);
                outcomes[i] = Replace::Replaced;
            }
        }

        loop {
            let clashes: Vec<usize> = {
                let fixed: HashSet<&str> = order
                    .iter()
                    .zip(&swap_at)
                    .filter(|(_, swap)| swap.is_none())
                    .map(|(token, _)| token.as_str())
                    .collect();
                let mut seen = HashSet::new();
                order
                    .iter()
                    .enumerate()
                    .filter(|(pos, _)| swap_at[*pos].is_some())
                    .filter(|(_, token)| {
                        fixed.contains(token.as_str()) || !seen.insert(token.as_str())
                    })
                    .map(|(pos, _)| pos)
                    .collect()
            };
            if clashes.is_empty() {
                break;
            }
            for pos in clashes {
                if let Some(i) = swap_at[pos].take() {
                    order[pos] = swaps[i].0.to_string();
                    outcomes[i] = Replace::Duplicate;
                }
            }
        }

        self.members = order.iter().cloned().collect();
        self.order = order;
        outcomes
    }

    /// Remove `token`, returning whether it was present.
    pub fn remove(&mut self, token: &str) -> bool {
        if !self.members.remove(token) {
            return false;
        }
        self.order.retain(|t| t != token);
        true
    }
}

/// Outcome of the most recent bulk refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshStatus {
    pub timestamp: DateTime<Utc>,
    pub success_count: usize,
    pub fail_count: usize,
}

/// Where the pool's initial tokens came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolOrigin {
    /// Read from the store.
    Loaded,
    /// Store had nothing yet; bootstrap list used.
    Bootstrapped,
    /// Store unreadable; bootstrap list used.
    Corrupt,
}

impl PoolOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            PoolOrigin::Loaded => "loaded",
            PoolOrigin::Bootstrapped => "bootstrapped",
            PoolOrigin::Corrupt => "corrupt",
        }
    }
}

/// What a mutating call did to the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Added,
    Replaced,
    Unchanged,
}

/// Result of one bulk refresh pass.
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub status: RefreshStatus,
    /// The set changed and the new set is durable, so session bindings
    /// should be moved onto it.
    pub propagate: bool,
}

/// Pool of provider tokens.
pub struct TokenPool {
    tokens: RwLock<TokenSet>,
    next_index: AtomicUsize,
    status: RwLock<Option<RefreshStatus>>,
    persist_gate: Mutex<()>,
    store: Arc<dyn TokenStore>,
    renewer: Arc<dyn TokenRenewer>,
}

impl TokenPool {
    /// Create a pool over an explicit token list without touching the store.
    pub fn new(
        tokens: Vec<String>,
        store: Arc<dyn TokenStore>,
        renewer: Arc<dyn TokenRenewer>,
    ) -> Self {
        let set = TokenSet::from_tokens(tokens);
        info!(tokens = set.len(), "token pool initialized");
        metrics::gauge!("token_pool_size").set(set.len() as f64);
        Self {
            tokens: RwLock::new(set),
            next_index: AtomicUsize::new(0),
            status: RwLock::new(None),
            persist_gate: Mutex::new(()),
            store,
            renewer,
        }
    }

    /// Create a pool from the store, falling back to `bootstrap` when the
    /// store is empty or unreadable. After a fallback the bootstrap list is
    /// written back so the store heals itself.
    pub async fn open(
        store: Arc<dyn TokenStore>,
        renewer: Arc<dyn TokenRenewer>,
        bootstrap: Vec<String>,
    ) -> (Self, PoolOrigin) {
        let (tokens, origin) = match store.load().await {
            StoreLoad::Loaded(tokens) => (tokens, PoolOrigin::Loaded),
            StoreLoad::NotFound => {
                info!(
                    tokens = bootstrap.len(),
                    "no persisted tokens, using bootstrap list"
                );
                (bootstrap, PoolOrigin::Bootstrapped)
            }
            StoreLoad::Corrupt(reason) => {
                warn!(%reason, tokens = bootstrap.len(), "token store corrupt, using bootstrap list");
                (bootstrap, PoolOrigin::Corrupt)
            }
        };

        let pool = Self::new(tokens, store, renewer);
        if origin != PoolOrigin::Loaded {
            match pool.persist().await {
                Ok(()) => info!(origin = origin.label(), "token store re-seeded"),
                Err(e) => warn!(error = %e, "could not write bootstrap tokens back to store"),
            }
        }
        (pool, origin)
    }

    /// Next token in round-robin order.
    pub async fn next(&self) -> Result<String> {
        let tokens = self.tokens.read().await;
        let n = tokens.len();
        if n == 0 {
            return Err(Error::EmptyPool);
        }
        let index = self.next_index.fetch_add(1, Ordering::Relaxed) % n;
        tokens.get(index).cloned().ok_or(Error::EmptyPool)
    }

    pub async fn contains(&self, token: &str) -> bool {
        self.tokens.read().await.contains(token)
    }

    pub async fn count(&self) -> usize {
        self.tokens.read().await.len()
    }

    /// Snapshot of the current list in pool order.
    pub async fn tokens(&self) -> Vec<String> {
        self.tokens.read().await.as_slice().to_vec()
    }

    pub async fn status(&self) -> Option<RefreshStatus> {
        self.status.read().await.clone()
    }

    /// Renew every token, install the results, persist, and record counts.
    ///
    /// Renewals run sequentially. Tokens added while the pass is running are
    /// kept; a slot that was replaced concurrently is left alone. If no slot
    /// changed, nothing is written.
    pub async fn bulk_refresh(&self) -> Result<RefreshOutcome> {
        let snapshot = self.tokens().await;
        if snapshot.is_empty() {
            warn!("no tokens available for refresh");
            return Err(Error::EmptyPool);
        }

        info!(tokens = snapshot.len(), "starting bulk token refresh");
        let mut renewed: Vec<(usize, &String, String)> = Vec::new();
        let mut fail_count = 0usize;

        for (slot, old) in snapshot.iter().enumerate() {
            let started = Instant::now();
            let result = self.renewer.renew(old).await;
            metrics::histogram!("token_renewal_duration_seconds")
                .record(started.elapsed().as_secs_f64());

            match result {
                Ok(new) => {
                    debug!(slot, "token renewed");
                    renewed.push((slot, old, new));
                }
                Err(e) => {
                    warn!(slot, token = %token_preview(old), error = %e, "token renewal failed, keeping old token");
                    metrics::counter!("token_renewals_total", "outcome" => "failure").increment(1);
                    fail_count += 1;
                }
            }
        }

        let mut success_count = 0usize;
        let mut changed = false;
        {
            let (slots, swaps): (Vec<usize>, Vec<(&str, String)>) = renewed
                .into_iter()
                .map(|(slot, old, new)| (slot, (old.as_str(), new)))
                .unzip();
            let mut set = self.tokens.write().await;
            let outcomes = set.replace_all(&swaps);
            for ((&slot, (old, new)), outcome) in slots.iter().zip(&swaps).zip(outcomes) {
                match outcome {
                    Replace::Replaced => {
                        success_count += 1;
                        changed |= *old != new.as_str();
                        metrics::counter!("token_renewals_total", "outcome" => "success")
                            .increment(1);
                    }
                    Replace::Duplicate => {
                        warn!(slot, "renewed token would duplicate another slot, keeping old token");
                        metrics::counter!("token_renewals_total", "outcome" => "failure")
                            .increment(1);
                        fail_count += 1;
                    }
                    Replace::Missing => {
                        debug!(slot, "slot changed during refresh, discarding renewal");
                        success_count += 1;
                    }
                }
            }
            metrics::gauge!("token_pool_size").set(set.len() as f64);
        }

        let status = RefreshStatus {
            timestamp: Utc::now(),
            success_count,
            fail_count,
        };
        *self.status.write().await = Some(status.clone());

        info!(
            success = success_count,
            failed = fail_count,
            tokens = snapshot.len(),
            "bulk token refresh completed"
        );

        if !changed {
            info!("no tokens changed, skipping persistence");
            return Ok(RefreshOutcome {
                status,
                propagate: false,
            });
        }

        self.persist().await.map_err(|e| {
            error!(error = %e, "refreshed tokens kept in memory but not persisted");
            e
        })?;

        Ok(RefreshOutcome {
            status,
            propagate: true,
        })
    }

    /// Append a token. Adding a token that is already present is a no-op.
    pub async fn add_token(&self, token: String) -> Result<Change> {
        {
            let mut set = self.tokens.write().await;
            if !set.push(token) {
                warn!("token already exists, not adding duplicate");
                return Ok(Change::Unchanged);
            }
            metrics::gauge!("token_pool_size").set(set.len() as f64);
        }

        self.persist().await?;
        info!("token added");
        Ok(Change::Added)
    }

    /// Replace `old` with `new`, or add `new` when `old` is unknown.
    ///
    /// If `new` already sits in another slot, `old` is dropped instead so the
    /// set stays duplicate-free.
    pub async fn update_token(&self, old: &str, new: String) -> Result<Change> {
        {
            let mut set = self.tokens.write().await;
            if !set.contains(old) {
                drop(set);
                warn!("old token not found, adding new token instead");
                return self.add_token(new).await;
            }
            if old == new {
                return Ok(Change::Unchanged);
            }
            if set.replace(old, new) == Replace::Duplicate {
                set.remove(old);
                warn!("new token already in pool, removed old token instead");
            }
            metrics::gauge!("token_pool_size").set(set.len() as f64);
        }

        self.persist().await?;
        info!("token updated");
        Ok(Change::Replaced)
    }

    /// Save the current list. Saves are serialized and the snapshot is taken
    /// inside the serialization, so the last write always carries the newest
    /// list.
    async fn persist(&self) -> Result<()> {
        let _gate = self.persist_gate.lock().await;
        let snapshot = self.tokens().await;
        self.store.save(&snapshot).await.map_err(|e| {
            error!(error = %e, tokens = snapshot.len(), "failed to persist tokens");
            metrics::counter!("token_persist_failures_total").increment(1);
            Error::Persistence(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, ScriptedRenewer, tokens};
    use hailuo_auth::FileTokenStore;
    use std::time::Duration;

    fn pool_with(
        initial: &[&str],
        store: Arc<MemoryStore>,
        renewer: Arc<ScriptedRenewer>,
    ) -> TokenPool {
        TokenPool::new(tokens(initial), store, renewer)
    }

    fn abc() -> (TokenPool, Arc<MemoryStore>, Arc<ScriptedRenewer>) {
        let store = Arc::new(MemoryStore::empty());
        let renewer = Arc::new(ScriptedRenewer::new());
        let pool = pool_with(&["A", "B", "C"], store.clone(), renewer.clone());
        (pool, store, renewer)
    }

    #[test]
    fn token_set_rejects_duplicates() {
        let mut set = TokenSet::from_tokens(tokens(&["a", "b", "a"]));
        assert_eq!(set.as_slice(), tokens(&["a", "b"]).as_slice());
        assert!(!set.push("b".into()));
        assert!(set.push("c".into()));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn token_set_replace_outcomes() {
        let mut set = TokenSet::from_tokens(tokens(&["a", "b"]));
        assert_eq!(set.replace("a", "a2".into()), Replace::Replaced);
        assert_eq!(set.replace("zz", "q".into()), Replace::Missing);
        assert_eq!(set.replace("b", "a2".into()), Replace::Duplicate);
        assert_eq!(set.as_slice(), tokens(&["a2", "b"]).as_slice());
        assert!(set.contains("a2"));
        assert!(!set.contains("a"));
    }

    #[test]
    fn token_set_replace_all_judges_duplicates_on_final_list() {
        let mut set = TokenSet::from_tokens(tokens(&["a", "b", "c"]));

        let outcomes = set.replace_all(&[("a", "b".into()), ("b", "b2".into())]);

        assert_eq!(outcomes, vec![Replace::Replaced, Replace::Replaced]);
        assert_eq!(set.as_slice(), tokens(&["b", "b2", "c"]).as_slice());
        assert!(set.contains("b2"));
        assert!(!set.contains("a"));
    }

    #[test]
    fn token_set_replace_all_reverts_clashes_until_clean() {
        let mut set = TokenSet::from_tokens(tokens(&["a", "b", "c"]));

        // b -> c clashes with the untouched c. Reverting b brings back "b",
        // which a had taken, so a is reverted too.
        let outcomes = set.replace_all(&[
            ("a", "b".into()),
            ("b", "c".into()),
            ("zz", "q".into()),
        ]);

        assert_eq!(
            outcomes,
            vec![Replace::Duplicate, Replace::Duplicate, Replace::Missing]
        );
        assert_eq!(set.as_slice(), tokens(&["a", "b", "c"]).as_slice());
        assert_eq!(set.len(), 3);
        assert!(set.contains("a") && set.contains("b") && set.contains("c"));
    }

    #[tokio::test]
    async fn round_robin_cycles_through_tokens() {
        let (pool, _, _) = abc();

        assert_eq!(pool.next().await.unwrap(), "A");
        assert_eq!(pool.next().await.unwrap(), "B");
        assert_eq!(pool.next().await.unwrap(), "C");
        assert_eq!(pool.next().await.unwrap(), "A");
    }

    #[tokio::test]
    async fn each_cycle_visits_every_token_once() {
        let store = Arc::new(MemoryStore::empty());
        let renewer = Arc::new(ScriptedRenewer::new());
        let pool = pool_with(&["t1", "t2", "t3", "t4", "t5"], store, renewer);

        for _ in 0..3 {
            let mut cycle = Vec::new();
            for _ in 0..5 {
                cycle.push(pool.next().await.unwrap());
            }
            cycle.sort();
            assert_eq!(cycle, tokens(&["t1", "t2", "t3", "t4", "t5"]));
        }
    }

    #[tokio::test]
    async fn empty_pool_next_fails() {
        let pool = pool_with(
            &[],
            Arc::new(MemoryStore::empty()),
            Arc::new(ScriptedRenewer::new()),
        );
        assert!(matches!(pool.next().await, Err(Error::EmptyPool)));
    }

    #[tokio::test]
    async fn refresh_keeps_failed_slot_in_place() {
        let (pool, store, renewer) = abc();
        renewer.fail("B");

        let outcome = pool.bulk_refresh().await.unwrap();

        assert_eq!(pool.tokens().await, tokens(&["A'", "B", "C'"]));
        assert_eq!(outcome.status.success_count, 2);
        assert_eq!(outcome.status.fail_count, 1);
        assert!(outcome.propagate);
        assert_eq!(store.saved(), Some(tokens(&["A'", "B", "C'"])));
        assert_eq!(pool.status().await, Some(outcome.status));
    }

    #[tokio::test]
    async fn refresh_runs_sequentially_in_pool_order() {
        let (pool, _, renewer) = abc();
        pool.bulk_refresh().await.unwrap();
        assert_eq!(renewer.seen(), tokens(&["A", "B", "C"]));
    }

    #[tokio::test(start_paused = true)]
    async fn pool_serves_while_renewal_is_in_flight() {
        let renewer = Arc::new(ScriptedRenewer::with_delay(Duration::from_secs(10)));
        let pool = Arc::new(pool_with(
            &["A", "B"],
            Arc::new(MemoryStore::empty()),
            renewer.clone(),
        ));

        let refresh = tokio::spawn({
            let pool = pool.clone();
            async move { pool.bulk_refresh().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(renewer.calls(), 1);

        let quick = Duration::from_millis(10);
        let served = tokio::time::timeout(quick, pool.next())
            .await
            .expect("next waited on the renewal")
            .unwrap();
        assert_eq!(served, "A");
        let added = tokio::time::timeout(quick, pool.add_token("D".into()))
            .await
            .expect("add_token waited on the renewal")
            .unwrap();
        assert_eq!(added, Change::Added);

        refresh.await.unwrap().unwrap();
        assert_eq!(pool.tokens().await, tokens(&["A'", "B'", "D"]));
    }

    #[tokio::test]
    async fn refresh_never_shrinks_pool() {
        let (pool, _, renewer) = abc();
        renewer.fail("A");
        renewer.fail("B");
        renewer.fail("C");

        let outcome = pool.bulk_refresh().await.unwrap();

        assert_eq!(pool.count().await, 3);
        assert_eq!(outcome.status.success_count, 0);
        assert_eq!(outcome.status.fail_count, 3);
    }

    #[tokio::test]
    async fn total_failure_skips_persistence() {
        let (pool, store, renewer) = abc();
        renewer.fail("A");
        renewer.fail("B");
        renewer.fail("C");

        let outcome = pool.bulk_refresh().await.unwrap();

        assert!(!outcome.propagate);
        assert_eq!(store.saves(), 0);
    }

    #[tokio::test]
    async fn renewal_into_existing_token_counts_as_failure() {
        let (pool, _, renewer) = abc();
        renewer.renew_to("A", "C'");

        let outcome = pool.bulk_refresh().await.unwrap();

        // A takes C' first in slot order, so C keeps its old value.
        assert_eq!(pool.tokens().await, tokens(&["C'", "B'", "C"]));
        assert_eq!(outcome.status.fail_count, 1);
        assert_eq!(outcome.status.success_count, 2);
    }

    #[tokio::test]
    async fn renewal_into_untouched_token_counts_as_failure() {
        let (pool, store, renewer) = abc();
        renewer.renew_to("A", "C");
        renewer.fail("C");

        let outcome = pool.bulk_refresh().await.unwrap();

        assert_eq!(pool.tokens().await, tokens(&["A", "B'", "C"]));
        assert_eq!(outcome.status.success_count, 1);
        assert_eq!(outcome.status.fail_count, 2);
        assert_eq!(store.saved(), Some(tokens(&["A", "B'", "C"])));
    }

    #[tokio::test]
    async fn renewal_into_value_freed_by_same_pass_is_accepted() {
        let (pool, _, renewer) = abc();
        renewer.renew_to("A", "B");
        renewer.renew_to("B", "B2");

        let outcome = pool.bulk_refresh().await.unwrap();

        assert_eq!(pool.tokens().await, tokens(&["B", "B2", "C'"]));
        assert_eq!(outcome.status.success_count, 3);
        assert_eq!(outcome.status.fail_count, 0);
    }

    #[tokio::test]
    async fn refresh_persistence_failure_keeps_memory_and_status() {
        let (pool, store, _) = abc();
        store.set_failing(true);

        let result = pool.bulk_refresh().await;

        assert!(matches!(result, Err(Error::Persistence(_))));
        assert_eq!(pool.tokens().await, tokens(&["A'", "B'", "C'"]));
        let status = pool.status().await.unwrap();
        assert_eq!(status.success_count, 3);
        assert_eq!(status.fail_count, 0);
    }

    #[tokio::test]
    async fn refresh_on_empty_pool_is_error_without_status() {
        let pool = pool_with(
            &[],
            Arc::new(MemoryStore::empty()),
            Arc::new(ScriptedRenewer::new()),
        );
        assert!(matches!(pool.bulk_refresh().await, Err(Error::EmptyPool)));
        assert!(pool.status().await.is_none());
    }

    #[tokio::test]
    async fn status_is_none_before_first_refresh() {
        let (pool, _, _) = abc();
        assert!(pool.status().await.is_none());
    }

    #[tokio::test]
    async fn add_token_is_idempotent() {
        let (pool, store, _) = abc();

        assert_eq!(pool.add_token("D".into()).await.unwrap(), Change::Added);
        assert_eq!(pool.add_token("D".into()).await.unwrap(), Change::Unchanged);

        assert_eq!(pool.count().await, 4);
        assert_eq!(store.saves(), 1);
        assert_eq!(store.saved(), Some(tokens(&["A", "B", "C", "D"])));
    }

    #[tokio::test]
    async fn update_token_replaces_in_place() {
        let (pool, store, _) = abc();

        assert_eq!(
            pool.update_token("B", "B2".into()).await.unwrap(),
            Change::Replaced
        );
        assert_eq!(pool.tokens().await, tokens(&["A", "B2", "C"]));
        assert_eq!(store.saved(), Some(tokens(&["A", "B2", "C"])));
    }

    #[tokio::test]
    async fn update_with_unknown_old_behaves_like_add() {
        let (updated, _, _) = abc();
        let (added, _, _) = abc();

        let via_update = updated.update_token("nope", "D".into()).await.unwrap();
        let via_add = added.add_token("D".into()).await.unwrap();

        assert_eq!(via_update, via_add);
        assert_eq!(updated.tokens().await, added.tokens().await);
    }

    #[tokio::test]
    async fn update_onto_existing_token_drops_old_slot() {
        let (pool, _, _) = abc();
        pool.update_token("A", "C".into()).await.unwrap();
        assert_eq!(pool.tokens().await, tokens(&["B", "C"]));
    }

    #[tokio::test]
    async fn add_persistence_failure_is_reported_but_not_rolled_back() {
        let (pool, store, _) = abc();
        store.set_failing(true);

        let result = pool.add_token("D".into()).await;

        assert!(matches!(result, Err(Error::Persistence(_))));
        assert!(pool.contains("D").await);
        assert_eq!(pool.count().await, 4);
    }

    #[tokio::test]
    async fn open_loads_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, r#"["x", "y"]"#).await.unwrap();

        let (pool, origin) = TokenPool::open(
            Arc::new(FileTokenStore::new(&path)),
            Arc::new(ScriptedRenewer::new()),
            tokens(&["bootstrap"]),
        )
        .await;

        assert_eq!(origin, PoolOrigin::Loaded);
        assert_eq!(pool.tokens().await, tokens(&["x", "y"]));
    }

    #[tokio::test]
    async fn open_bootstraps_and_self_heals_missing_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("tokens.json");

        let (pool, origin) = TokenPool::open(
            Arc::new(FileTokenStore::new(&path)),
            Arc::new(ScriptedRenewer::new()),
            tokens(&["b1", "b2"]),
        )
        .await;

        assert_eq!(origin, PoolOrigin::Bootstrapped);
        assert_eq!(pool.count().await, 2);
        let on_disk: Vec<String> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(on_disk, tokens(&["b1", "b2"]));
    }

    #[tokio::test]
    async fn open_reports_corrupt_store_and_rewrites_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        tokio::fs::write(&path, "not json at all").await.unwrap();

        let (pool, origin) = TokenPool::open(
            Arc::new(FileTokenStore::new(&path)),
            Arc::new(ScriptedRenewer::new()),
            tokens(&["b1"]),
        )
        .await;

        assert_eq!(origin, PoolOrigin::Corrupt);
        assert_eq!(pool.tokens().await, tokens(&["b1"]));
        let on_disk: Vec<String> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(on_disk, tokens(&["b1"]));
    }

    #[tokio::test]
    async fn open_survives_unwritable_store() {
        let store = Arc::new(MemoryStore::empty());
        store.set_failing(true);

        let (pool, origin) =
            TokenPool::open(store, Arc::new(ScriptedRenewer::new()), tokens(&["b1"])).await;

        assert_eq!(origin, PoolOrigin::Bootstrapped);
        assert_eq!(pool.next().await.unwrap(), "b1");
    }

    #[test]
    fn refresh_status_serializes_camel_case() {
        let status = RefreshStatus {
            timestamp: "2026-10-18T08:00:00Z".parse().unwrap(),
            success_count: 2,
            fail_count: 1,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["successCount"], 2);
        assert_eq!(json["failCount"], 1);
        assert_eq!(json["timestamp"], "2026-10-18T08:00:00Z");
    }
}
