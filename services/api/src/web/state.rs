//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-user staging lists.

use crate::config::Config;
use chrono::{DateTime, Duration, Utc};
use pantry_core::intake::{StagingAction, StagingList};
use pantry_core::{
    AuthGateway, IdentityChange, PantryResult, PantryStore, ReceiptScanner, ShelfLifeLookup,
};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: PantryStore,
    pub auth: AuthGateway,
    pub scanner: Arc<dyn ReceiptScanner>,
    pub shelf_life: Arc<dyn ShelfLifeLookup>,
    pub staging: StagingArea,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: PantryStore,
        auth: AuthGateway,
        scanner: Arc<dyn ReceiptScanner>,
        shelf_life: Arc<dyn ShelfLifeLookup>,
    ) -> Arc<Self> {
        let staging = StagingArea::new(auth.session_ttl());
        let state = Arc::new(Self {
            config,
            store,
            auth,
            scanner,
            shelf_life,
            staging,
        });
        state.discard_staging_on_sign_out();
        state
    }

    /// Drops a user's staging list when they sign out. The listener holds only
    /// a weak reference and stops once the state is gone.
    fn discard_staging_on_sign_out(self: &Arc<Self>) {
        let mut changes = self.auth.on_identity_changed();
        let state: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(change) = changes.next().await {
                let IdentityChange::SignedOut { user_id } = change else {
                    continue;
                };
                let Some(state) = state.upgrade() else {
                    break;
                };
                if state.staging.remove(user_id).await {
                    debug!(%user_id, "Discarded staged receipt on sign-out");
                }
            }
            changes.unsubscribe();
        });
    }
}

//=========================================================================================
// Staging Area
//=========================================================================================

struct StagingSlot {
    list: StagingList,
    touched_at: DateTime<Utc>,
}

/// Uncommitted receipt intake, one list per user. A list left alone for longer
/// than `idle_limit` is dropped on the next access, so lists of users whose
/// sessions simply expired do not pile up.
pub struct StagingArea {
    idle_limit: Duration,
    lists: Mutex<HashMap<Uuid, StagingSlot>>,
}

impl StagingArea {
    pub fn new(idle_limit: Duration) -> Self {
        Self {
            idle_limit,
            lists: Mutex::new(HashMap::new()),
        }
    }

    async fn swept(&self, now: DateTime<Utc>) -> MutexGuard<'_, HashMap<Uuid, StagingSlot>> {
        let mut lists = self.lists.lock().await;
        let before = lists.len();
        lists.retain(|_, slot| now - slot.touched_at <= self.idle_limit);
        if lists.len() < before {
            debug!(dropped = before - lists.len(), "Swept idle staging lists");
        }
        lists
    }

    /// A copy of the user's list, if anything is staged.
    pub async fn get(&self, user_id: Uuid, now: DateTime<Utc>) -> Option<StagingList> {
        self.swept(now).await.get(&user_id).map(|slot| slot.list.clone())
    }

    /// Applies one action to the user's list, creating the list if needed.
    pub async fn reduce(
        &self,
        user_id: Uuid,
        action: StagingAction,
        now: DateTime<Utc>,
    ) -> PantryResult<StagingList> {
        let mut lists = self.swept(now).await;
        let slot = lists.entry(user_id).or_insert_with(|| StagingSlot {
            list: StagingList::new(now),
            touched_at: now,
        });
        slot.list.reduce(action, now)?;
        slot.touched_at = now;
        Ok(slot.list.clone())
    }

    /// Drops the user's list. Returns whether there was one.
    pub async fn remove(&self, user_id: Uuid) -> bool {
        self.lists.lock().await.remove(&user_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pantry_core::{Category, ItemDraft};

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 5, hour, 0, 0).unwrap()
    }

    fn add(name: &str) -> StagingAction {
        StagingAction::Add(ItemDraft::new(name, Category::Produce))
    }

    #[tokio::test]
    async fn idle_lists_are_swept_on_later_access() {
        let area = StagingArea::new(Duration::hours(1));
        let (stale, active) = (Uuid::new_v4(), Uuid::new_v4());

        area.reduce(stale, add("Kale"), at_hour(8)).await.unwrap();
        area.reduce(active, add("Leeks"), at_hour(8)).await.unwrap();
        area.reduce(active, add("Chard"), at_hour(9)).await.unwrap();

        let later = at_hour(9) + Duration::minutes(30);
        assert!(area.get(stale, later).await.is_none());
        assert_eq!(area.get(active, later).await.map(|l| l.items.len()), Some(2));
        assert!(!area.remove(stale).await);
        assert!(area.remove(active).await);
    }

    #[tokio::test]
    async fn a_failed_action_still_leaves_the_list_in_place() {
        let area = StagingArea::new(Duration::hours(1));
        let user = Uuid::new_v4();
        area.reduce(user, add("Kale"), at_hour(8)).await.unwrap();

        assert!(area
            .reduce(user, StagingAction::Remove(Uuid::new_v4()), at_hour(8))
            .await
            .is_err());
        assert_eq!(area.get(user, at_hour(8)).await.map(|l| l.items.len()), Some(1));
    }
}
