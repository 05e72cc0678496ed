use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::storage::{ChallengeClaim, PurchaseOutcome, SessionEnd, StorageError, Store};

type ChildLockMap = Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Single owner of the star balance. Every mutation path (session-end
/// earn, challenge bonus, shop spend) funnels through here and is
/// serialized per child, so two concurrent paths cannot lose an
/// update to a read-then-write race.
#[derive(Clone)]
pub struct StarLedger {
    store: Store,
    child_locks: ChildLockMap,
}

impl StarLedger {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            child_locks: Default::default(),
        }
    }

    async fn child_lock(&self, child_id: &str) -> Arc<Mutex<()>> {
        let mut map = self.child_locks.lock().await;
        map.entry(child_id.to_string())
            .or_insert_with(Default::default)
            .clone()
    }

    /// End a game session and credit stars for its score, exactly
    /// once. `None` means the session id is unknown for this child.
    pub async fn settle_session(
        &self,
        session_id: &str,
        child_id: &str,
        score: i32,
        meta: Option<&str>,
    ) -> Result<Option<SessionEnd>, StorageError> {
        let lock = self.child_lock(child_id).await;
        let _guard = lock.lock().await;
        self.store
            .finish_game_session(session_id, child_id, score, meta)
            .await
    }

    /// Credit the daily-challenge bonus, guarded by the one-shot
    /// claimed flag.
    pub async fn claim_daily_bonus(
        &self,
        child_id: &str,
        day: NaiveDate,
    ) -> Result<ChallengeClaim, StorageError> {
        let lock = self.child_lock(child_id).await;
        let _guard = lock.lock().await;
        self.store.claim_challenge_reward(child_id, day).await
    }

    /// Spend stars on a shop item; rejected when the balance does not
    /// cover the cost.
    pub async fn purchase(
        &self,
        child_id: &str,
        item_id: &str,
    ) -> Result<PurchaseOutcome, StorageError> {
        let lock = self.child_lock(child_id).await;
        let _guard = lock.lock().await;
        self.store.purchase_item(child_id, item_id).await
    }

    /// Drop the per-child lock entry after a child profile is deleted.
    pub async fn forget_child(&self, child_id: &str) {
        let mut map = self.child_locks.lock().await;
        map.remove(child_id);
    }
}
