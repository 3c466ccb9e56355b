//! In-process doubles for the renewal endpoint and the token store

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use hailuo_auth::{StoreLoad, TokenRenewer, TokenStore};

/// Renews `t` to `"{t}'"` unless told otherwise.
#[derive(Default)]
pub struct ScriptedRenewer {
    failing: Mutex<HashSet<String>>,
    overrides: Mutex<HashMap<String, String>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl ScriptedRenewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every renewal sleeps for `delay` first (pair with paused time).
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail(&self, token: &str) {
        self.failing.lock().unwrap().insert(token.to_string());
    }

    pub fn renew_to(&self, token: &str, renewed: &str) {
        self.overrides
            .lock()
            .unwrap()
            .insert(token.to_string(), renewed.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tokens passed to `renew`, in call order.
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl TokenRenewer for ScriptedRenewer {
    fn renew<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = hailuo_auth::Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(token.to_string());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.failing.lock().unwrap().contains(token) {
                return Err(hailuo_auth::Error::Timeout(Duration::from_secs(10)));
            }
            let renewed = self
                .overrides
                .lock()
                .unwrap()
                .get(token)
                .cloned()
                .unwrap_or_else(|| format!("{token}'"));
            Ok(renewed)
        })
    }
}

/// Token store held in memory, with switchable save failures.
pub struct MemoryStore {
    initial: StoreLoad,
    saved: Mutex<Option<Vec<String>>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new(initial: StoreLoad) -> Self {
        Self {
            initial,
            saved: Mutex::new(None),
            saves: AtomicUsize::new(0),
            fail_saves: AtomicBool::new(false),
        }
    }

    pub fn empty() -> Self {
        Self::new(StoreLoad::NotFound)
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_saves.store(failing, Ordering::SeqCst);
    }

    /// Last successfully saved list.
    pub fn saved(&self) -> Option<Vec<String>> {
        self.saved.lock().unwrap().clone()
    }

    /// Number of save attempts, failed ones included.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl TokenStore for MemoryStore {
    fn load(&self) -> Pin<Box<dyn Future<Output = StoreLoad> + Send + '_>> {
        Box::pin(async move {
            match self.saved.lock().unwrap().clone() {
                Some(tokens) if !tokens.is_empty() => StoreLoad::Loaded(tokens),
                _ => self.initial.clone(),
            }
        })
    }

    fn save<'a>(
        &'a self,
        tokens: &'a [String],
    ) -> Pin<Box<dyn Future<Output = hailuo_auth::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.saves.fetch_add(1, Ordering::SeqCst);
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(hailuo_auth::Error::Io("disk full".into()));
            }
            *self.saved.lock().unwrap() = Some(tokens.to_vec());
            Ok(())
        })
    }
}

pub fn tokens(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}
