use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Lock state of the active child session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    Locked,
    /// Parent-PIN override; lasts only for the lifetime of the active
    /// session and is never persisted.
    UnlockedTemporary,
}

impl LockState {
    pub fn is_locked(self) -> bool {
        matches!(self, LockState::Locked)
    }
}

/// Pure lock derivation: locked iff the daily budget is exhausted and
/// no temporary override is active.
pub fn derive_lock_state(minutes_used: i32, daily_limit: i32, temporary_unlock: bool) -> LockState {
    if temporary_unlock {
        LockState::UnlockedTemporary
    } else if minutes_used >= daily_limit {
        LockState::Locked
    } else {
        LockState::Unlocked
    }
}

/// Shared, in-memory gate for one active child session. The heartbeat
/// task publishes new minute totals here; settings saves publish limit
/// changes; the unlock path flips the temporary flag. The state is
/// re-derived on every read, so any of those changes takes effect on
/// the next check.
#[derive(Debug)]
pub struct LockGate {
    minutes_used: AtomicI32,
    daily_limit: AtomicI32,
    temporary_unlock: AtomicBool,
}

impl LockGate {
    pub fn new(minutes_used: i32, daily_limit: i32) -> Self {
        Self {
            minutes_used: AtomicI32::new(minutes_used),
            daily_limit: AtomicI32::new(daily_limit),
            temporary_unlock: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> LockState {
        derive_lock_state(
            self.minutes_used.load(Ordering::SeqCst),
            self.daily_limit.load(Ordering::SeqCst),
            self.temporary_unlock.load(Ordering::SeqCst),
        )
    }

    pub fn is_locked(&self) -> bool {
        self.state().is_locked()
    }

    pub fn minutes_used(&self) -> i32 {
        self.minutes_used.load(Ordering::SeqCst)
    }

    pub fn daily_limit(&self) -> i32 {
        self.daily_limit.load(Ordering::SeqCst)
    }

    pub fn temporarily_unlocked(&self) -> bool {
        self.temporary_unlock.load(Ordering::SeqCst)
    }

    /// Publish the ledger's new total. Totals can drop across a day
    /// rollover, when the new day's counter starts over.
    pub fn set_minutes_used(&self, minutes: i32) {
        self.minutes_used.store(minutes, Ordering::SeqCst);
    }

    pub fn set_daily_limit(&self, limit: i32) {
        self.daily_limit.store(limit, Ordering::SeqCst);
    }

    pub fn grant_temporary_unlock(&self) {
        self.temporary_unlock.store(true, Ordering::SeqCst);
    }
}
