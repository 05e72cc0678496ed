pub mod day;
pub mod ledger;
pub mod lock;
pub mod streak;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::{StorageError, Store};
use lock::LockGate;

/// Daily limit applied when a child has no settings row yet.
pub const DEFAULT_DAILY_LIMIT_MINUTES: i32 = 30;
/// Delay before the single retry of a failed usage tick.
const TICK_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Returns whether `module` may be started under the given enabled
/// set. An empty set means no restriction (fail-open), not "nothing
/// allowed".
pub fn module_allowed(enabled: &[String], module: &str) -> bool {
    enabled.is_empty() || enabled.iter().any(|m| m == module)
}

struct ActiveChild {
    child_id: String,
    gate: Arc<LockGate>,
    cancel: CancellationToken,
}

impl Drop for ActiveChild {
    fn drop(&mut self) {
        // Tears the heartbeat task down; a leaked timer must never
        // keep ticking another (or a deleted) child's ledger.
        self.cancel.cancel();
    }
}

/// Owns the active child session per signed-in user: the in-memory
/// lock gate and the heartbeat task accruing play minutes.
pub struct Supervisor {
    store: Store,
    tz: Tz,
    tick_interval: Duration,
    active: Mutex<HashMap<String, ActiveChild>>,
    shutdown: CancellationToken,
}

impl Supervisor {
    pub fn new(store: Store, tz: Tz, tick_interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            store,
            tz,
            tick_interval,
            active: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Make `child_id` the user's active child. Any previously active
    /// session for this user is cancelled first; per-child derived
    /// state (minutes, limit, temporary unlock) is re-read from the
    /// store, so a re-select after reload re-derives the lock state
    /// without any leftover override.
    pub async fn select(&self, username: &str, child_id: &str) -> Result<Arc<LockGate>, StorageError> {
        let today = day::today(self.tz);
        let limit = match self.store.get_settings(child_id).await? {
            Some(s) => s.daily_limit_minutes,
            None => DEFAULT_DAILY_LIMIT_MINUTES,
        };
        let used = self.store.get_usage(child_id, today).await?;

        let gate = Arc::new(LockGate::new(used, limit));
        let cancel = self.shutdown.child_token();
        tokio::spawn(heartbeat_loop(
            self.store.clone(),
            child_id.to_string(),
            gate.clone(),
            cancel.child_token(),
            self.tick_interval,
            self.tz,
        ));
        info!(username, child_id, minutes_used = used, daily_limit = limit, "child selected");

        let mut map = self.active.lock().await;
        map.insert(
            username.to_string(),
            ActiveChild {
                child_id: child_id.to_string(),
                gate: gate.clone(),
                cancel,
            },
        );
        Ok(gate)
    }

    /// Drop the user's active session if it is for `child_id` (or
    /// unconditionally when `child_id` is `None`, e.g. on sign-out).
    pub async fn deselect(&self, username: &str, child_id: Option<&str>) -> bool {
        let mut map = self.active.lock().await;
        match child_id {
            Some(cid) => {
                if map.get(username).is_some_and(|a| a.child_id == cid) {
                    map.remove(username);
                    info!(username, child_id = cid, "child deselected");
                    true
                } else {
                    false
                }
            }
            None => map.remove(username).is_some(),
        }
    }

    /// Gate for the user's active session, if it is for `child_id`.
    pub async fn gate(&self, username: &str, child_id: &str) -> Option<Arc<LockGate>> {
        let map = self.active.lock().await;
        map.get(username)
            .filter(|a| a.child_id == child_id)
            .map(|a| a.gate.clone())
    }

    /// Push a saved limit change into every active gate for the child,
    /// so the lock check re-runs immediately rather than at the next
    /// selection.
    pub async fn apply_limit_change(&self, child_id: &str, daily_limit: i32) {
        let map = self.active.lock().await;
        for active in map.values() {
            if active.child_id == child_id {
                active.gate.set_daily_limit(daily_limit);
            }
        }
    }

    /// Cancel every active session for the child (profile deleted).
    pub async fn evict_child(&self, child_id: &str) {
        let mut map = self.active.lock().await;
        map.retain(|_, a| a.child_id != child_id);
    }
}

/// Accrues one minute of usage per tick while the gate is not locked.
/// The ledger write is an atomic per-day increment; a failed write is
/// retried once and then skipped (losing one tick is cheap, stalling
/// the loop is not).
async fn heartbeat_loop(
    store: Store,
    child_id: String,
    gate: Arc<LockGate>,
    cancel: CancellationToken,
    interval: Duration,
    tz: Tz,
) {
    debug!(child_id = %child_id, ?interval, "heartbeat started");
    let mut current_day = day::today(tz);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(child_id = %child_id, "heartbeat cancelled");
                break;
            }
            _ = sleep(interval) => {}
        }

        // The rollover check must run before the locked check: a gate
        // locked on yesterday's total has to see the new day's fresh
        // count, or it would stay locked all day.
        let today = day::today(tz);
        if today != current_day {
            match refresh_day(&store, &child_id, &gate, today).await {
                Ok(used) => {
                    info!(child_id = %child_id, day = %today, minutes_used = used, "day rolled over");
                    current_day = today;
                }
                Err(e) => {
                    warn!(child_id = %child_id, error = %e, "usage re-read after day rollover failed");
                    continue;
                }
            }
        }

        if gate.is_locked() {
            debug!(child_id = %child_id, "locked; skipping tick");
            continue;
        }

        let total = match store.tick_usage(&child_id, today).await {
            Ok(t) => t,
            Err(e) => {
                warn!(child_id = %child_id, error = %e, "usage tick failed; retrying once");
                sleep(TICK_RETRY_DELAY).await;
                match store.tick_usage(&child_id, today).await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(child_id = %child_id, error = %e, "usage tick retry failed; skipping");
                        continue;
                    }
                }
            }
        };
        gate.set_minutes_used(total);
        if gate.state() == lock::LockState::Locked {
            info!(child_id = %child_id, minutes_used = total, "daily limit reached; locking");
        }
    }
}

/// Publishes the stored total for `today` to the gate, so the lock
/// state re-derives against the new day's count.
async fn refresh_day(
    store: &Store,
    child_id: &str,
    gate: &LockGate,
    today: NaiveDate,
) -> Result<i32, StorageError> {
    let used = store.get_usage(child_id, today).await?;
    gate.set_minutes_used(used);
    Ok(used)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_module_set_allows_everything() {
        assert!(module_allowed(&[], "math-race"));
    }

    #[test]
    fn non_empty_set_restricts() {
        let enabled = vec!["math-race".to_string(), "word-hunt".to_string()];
        assert!(module_allowed(&enabled, "word-hunt"));
        assert!(!module_allowed(&enabled, "sentence-builder"));
    }

    #[tokio::test]
    async fn day_rollover_reopens_locked_gate() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("app.db");
        let store = Store::connect_sqlite(db.to_str().unwrap()).await.unwrap();

        let day1: NaiveDate = "2026-08-29".parse().unwrap();
        let day2: NaiveDate = "2026-08-30".parse().unwrap();
        for _ in 0..30 {
            store.tick_usage("nova", day1).await.unwrap();
        }

        let used = store.get_usage("nova", day1).await.unwrap();
        let gate = LockGate::new(used, 30);
        assert!(gate.is_locked());

        let fresh = refresh_day(&store, "nova", &gate, day2).await.unwrap();
        assert_eq!(fresh, 0);
        assert!(!gate.is_locked());
        assert_eq!(gate.minutes_used(), 0);
    }
}
