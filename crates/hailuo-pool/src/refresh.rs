//! Background timers: bulk token refresh and session sweep
//!
//! Two independent repeating tasks drive the broker. The refresh task fires
//! once immediately so a freshly started instance never serves tokens older
//! than the last deploy, then every `refresh_interval`. The sweep task fires
//! every five minutes. Overlap needs no guard here: the broker already makes
//! bulk refresh single-flight and a sweep is a short critical section.
//!
//! Tasks hold a `Weak` reference to the scheduler. Cancellation only ever
//! interrupts the wait between ticks: a tick that has started runs to
//! completion, so a refresh pass is never cut off between renewing tokens
//! and installing them. `stop` waits for such a tick; `reschedule` and drop
//! let it finish in the background.

use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::broker::TokenBroker;

/// Default time between bulk refreshes (one week).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Time between session sweeps.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

pub struct RefreshScheduler {
    broker: Arc<TokenBroker>,
    refresh_interval: Mutex<Duration>,
    sweep_interval: Duration,
    last_refresh: Mutex<DateTime<Utc>>,
    refresh_task: Mutex<Option<Timer>>,
    sweep_task: Mutex<Option<Timer>>,
}

/// A spawned repeating task and the switch that ends it between ticks.
struct Timer {
    cancel: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Timer {
    fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

impl RefreshScheduler {
    pub fn new(broker: Arc<TokenBroker>, refresh_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            broker,
            refresh_interval: Mutex::new(refresh_interval),
            sweep_interval: SWEEP_INTERVAL,
            last_refresh: Mutex::new(Utc::now()),
            refresh_task: Mutex::new(None),
            sweep_task: Mutex::new(None),
        })
    }

    /// Spawn both timers. The first bulk refresh runs immediately.
    pub fn start(self: &Arc<Self>) {
        let interval = self.refresh_interval();
        self.spawn_refresh(Instant::now(), interval);

        let sweep_every = self.sweep_interval;
        let timer = spawn_repeating(
            Arc::downgrade(self),
            Instant::now() + sweep_every,
            sweep_every,
            |scheduler| async move { scheduler.run_sweep_tick().await },
        );
        replace_task(&self.sweep_task, timer);

        info!(
            refresh_interval_secs = interval.as_secs(),
            sweep_interval_secs = sweep_every.as_secs(),
            "token refresh scheduled"
        );
    }

    /// Cancel the refresh timer and restart it with a new interval. The next
    /// refresh fires one full interval from now. A refresh already running
    /// on the old timer still completes.
    pub fn reschedule(self: &Arc<Self>, refresh_interval: Duration) {
        *lock(&self.refresh_interval) = refresh_interval;
        self.spawn_refresh(Instant::now() + refresh_interval, refresh_interval);
        *lock(&self.last_refresh) = Utc::now();
        info!(
            refresh_interval_secs = refresh_interval.as_secs(),
            "token refresh rescheduled"
        );
    }

    /// Cancel both timers and wait for a tick that is already running.
    pub async fn stop(&self) {
        let timers: Vec<Timer> = [&self.refresh_task, &self.sweep_task]
            .into_iter()
            .filter_map(|slot| lock(slot).take())
            .collect();
        for timer in timers {
            timer.cancel();
            if let Err(e) = timer.handle.await {
                warn!(error = %e, "scheduler task ended abnormally");
            }
        }
        debug!("refresh scheduler stopped");
    }

    pub fn refresh_interval(&self) -> Duration {
        *lock(&self.refresh_interval)
    }

    /// Wall-clock time the next scheduled refresh is due.
    pub fn next_scheduled_refresh(&self) -> DateTime<Utc> {
        let last = *lock(&self.last_refresh);
        let step = TimeDelta::from_std(self.refresh_interval()).unwrap_or(TimeDelta::MAX);
        last.checked_add_signed(step).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// One refresh timer tick.
    pub async fn run_refresh_tick(&self) {
        match self.broker.force_refresh_all().await {
            Ok(status) => info!(
                success = status.success_count,
                failed = status.fail_count,
                "scheduled token refresh finished"
            ),
            Err(e) => warn!(error = %e, "scheduled token refresh failed"),
        }
        *lock(&self.last_refresh) = Utc::now();
    }

    /// One sweep timer tick.
    pub async fn run_sweep_tick(&self) {
        let removed = self.broker.sweep_sessions().await;
        debug!(removed, "session sweep finished");
    }

    fn spawn_refresh(self: &Arc<Self>, start: Instant, every: Duration) {
        let timer = spawn_repeating(Arc::downgrade(self), start, every, |scheduler| async move {
            scheduler.run_refresh_tick().await
        });
        replace_task(&self.refresh_task, timer);
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        for slot in [&mut self.refresh_task, &mut self.sweep_task] {
            let slot = slot.get_mut().unwrap_or_else(PoisonError::into_inner);
            if let Some(timer) = slot.take() {
                timer.cancel();
            }
        }
    }
}

/// Run `tick` at `start` and then every `every` until cancelled or the
/// scheduler is gone. Cancellation is only observed between ticks.
fn spawn_repeating<F, Fut>(
    scheduler: Weak<RefreshScheduler>,
    start: Instant,
    every: Duration,
    tick: F,
) -> Timer
where
    F: Fn(Arc<RefreshScheduler>) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    let (cancel, mut cancelled) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(start, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                _ = cancelled.changed() => break,
                _ = ticker.tick() => {}
            }
            let Some(scheduler) = scheduler.upgrade() else {
                break;
            };
            tick(scheduler).await;
        }
    });
    Timer { cancel, handle }
}

/// Install `timer`, cancelling the one it replaces. The old task is left to
/// finish its current tick.
fn replace_task(slot: &Mutex<Option<Timer>>, timer: Timer) {
    if let Some(previous) = lock(slot).replace(timer) {
        previous.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
