//! crates/pantry_core/src/store.rs
//!
//! The pantry store facade. One CRUD interface over whichever `PantryBackend`
//! was chosen at startup; every read comes back through the lifecycle engine so
//! callers always see normalized items with a fresh `days_left`.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::domain::{Identity, Item, ItemDraft, ItemId, RawItem, User};
use crate::error::{PantryError, PantryResult};
use crate::lifecycle::{self, Dashboard, PantryStats};
use crate::ports::{PantryBackend, PortError};

/// Result of clearing a pantry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteAllOutcome {
    pub success: bool,
    pub deleted: usize,
    pub message: String,
}

impl DeleteAllOutcome {
    fn deleted(count: usize) -> Self {
        let message = match count {
            0 => "No items to delete".to_string(),
            1 => "Deleted 1 item".to_string(),
            n => format!("Deleted {} items", n),
        };
        Self {
            success: true,
            deleted: count,
            message,
        }
    }
}

/// Result of consuming one unit of an item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UseOutcome {
    pub item: Item,
    /// True when this use brought the quantity to zero.
    pub newly_saved: bool,
    pub items: Vec<Item>,
    pub stats: PantryStats,
}

/// Builds the persisted form of a new item bought on `purchase_date`.
pub fn draft_to_raw(draft: &ItemDraft, purchase_date: DateTime<Utc>, now: DateTime<Utc>) -> RawItem {
    let recalc = draft
        .expiry_days
        .filter(|_| draft.is_perishable)
        .map(|days| lifecycle::recalculate_expiry(purchase_date, days, now));
    let item = Item {
        id: 0,
        name: draft.name.clone(),
        category: draft.category,
        quantity: draft.quantity,
        price: draft.price.clone(),
        is_perishable: draft.is_perishable,
        purchase_date,
        expiry_days: draft.expiry_days,
        expiry_date: recalc.and_then(|r| r.expiry_date),
        days_left: recalc.and_then(|r| r.days_left),
        saved: false,
    };
    RawItem {
        id: None,
        ..item.to_raw()
    }
}

#[derive(Clone)]
pub struct PantryStore {
    backend: Arc<dyn PantryBackend>,
    clock: Arc<dyn Clock>,
}

impl PantryStore {
    pub fn new(backend: Arc<dyn PantryBackend>, clock: Arc<dyn Clock>) -> Self {
        Self { backend, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn normalize(&self, raw: Vec<RawItem>) -> Vec<Item> {
        lifecycle::normalize_all(&raw, self.clock.now())
    }

    /// Returns the user record, creating it on first use.
    pub async fn user(&self, identity: &Identity) -> PantryResult<User> {
        Ok(self.backend.ensure_user(identity).await?)
    }

    pub async fn get_items(&self, identity: &Identity) -> PantryResult<Vec<Item>> {
        let raw = self.backend.load_items(identity.user_id).await?;
        Ok(self.normalize(raw))
    }

    pub async fn dashboard(&self, identity: &Identity) -> PantryResult<Dashboard> {
        let items = self.get_items(identity).await?;
        Ok(lifecycle::dashboard(&items, self.clock.now()))
    }

    /// Bulk insert of items bought together. Ids come from the user's counter.
    pub async fn save_items(
        &self,
        identity: &Identity,
        purchase_date: DateTime<Utc>,
        drafts: Vec<ItemDraft>,
    ) -> PantryResult<Vec<Item>> {
        if drafts.is_empty() {
            return self.get_items(identity).await;
        }
        let now = self.clock.now();
        let raw: Vec<RawItem> = drafts
            .iter()
            .map(|d| draft_to_raw(d, purchase_date, now))
            .collect();
        info!(user_id = %identity.user_id, count = raw.len(), "Saving items to pantry");
        let stored = self.backend.append_items(identity.user_id, raw).await?;
        Ok(self.normalize(stored))
    }

    pub async fn add_item(
        &self,
        identity: &Identity,
        purchase_date: DateTime<Utc>,
        draft: ItemDraft,
    ) -> PantryResult<Vec<Item>> {
        self.save_items(identity, purchase_date, vec![draft]).await
    }

    /// Replaces the stored item with the same id.
    pub async fn edit_item(&self, identity: &Identity, item: Item) -> PantryResult<Vec<Item>> {
        debug!(user_id = %identity.user_id, item_id = item.id, "Editing item");
        let stored = self
            .backend
            .replace_item(identity.user_id, item.to_raw())
            .await?;
        Ok(self.normalize(stored))
    }

    pub async fn delete_item(&self, identity: &Identity, item_id: ItemId) -> PantryResult<Vec<Item>> {
        debug!(user_id = %identity.user_id, item_id, "Deleting item");
        let stored = self.backend.remove_item(identity.user_id, item_id).await?;
        Ok(self.normalize(stored))
    }

    /// Clears the pantry. Uses the backend's bulk primitive when it has one and
    /// otherwise deletes every item concurrently, without rollback.
    pub async fn delete_all_items(&self, identity: &Identity) -> PantryResult<DeleteAllOutcome> {
        let user_id = identity.user_id;
        let items = self.backend.load_items(user_id).await?;
        if items.is_empty() {
            return Ok(DeleteAllOutcome::deleted(0));
        }

        match self.backend.clear_items(user_id).await {
            Ok(deleted) => {
                info!(%user_id, deleted, "Cleared pantry");
                Ok(DeleteAllOutcome::deleted(deleted))
            }
            Err(PortError::Unsupported(_)) => {
                debug!(%user_id, "No bulk clear available; deleting items one at a time");
                self.delete_one_by_one(user_id, &items).await
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_one_by_one(
        &self,
        user_id: uuid::Uuid,
        items: &[RawItem],
    ) -> PantryResult<DeleteAllOutcome> {
        let ids: Vec<ItemId> = items.iter().filter_map(|i| i.id).collect();
        let total = ids.len();
        let results = join_all(ids.iter().map(|&id| self.backend.remove_item(user_id, id))).await;

        let deleted = results.iter().filter(|r| r.is_ok()).count();
        for e in results.iter().filter_map(|r| r.as_ref().err()) {
            warn!(%user_id, "Item delete failed during delete-all: {}", e);
        }

        if deleted == total {
            info!(%user_id, deleted, "Cleared pantry item by item");
            Ok(DeleteAllOutcome::deleted(deleted))
        } else {
            Err(PantryError::PartialBatchFailure {
                deleted,
                failed: total - deleted,
                total,
            })
        }
    }

    /// Consumes one unit of an item and persists the result.
    pub async fn use_item(&self, identity: &Identity, item_id: ItemId) -> PantryResult<UseOutcome> {
        let items = self.get_items(identity).await?;
        let current = items
            .iter()
            .find(|i| i.id == item_id)
            .ok_or_else(|| PantryError::NotFound(format!("Item {} not found", item_id)))?;

        let updated = lifecycle::use_item(current)?;
        let newly_saved = updated.saved && !current.saved;
        let stored = self
            .backend
            .replace_item(identity.user_id, updated.to_raw())
            .await?;
        let items = self.normalize(stored);
        let stats = lifecycle::aggregate_stats(&items);

        if newly_saved {
            info!(user_id = %identity.user_id, item_id, saved = stats.saved, "Item saved from waste");
        }

        let item = items
            .iter()
            .find(|i| i.id == item_id)
            .cloned()
            .unwrap_or(updated);
        Ok(UseOutcome {
            item,
            newly_saved,
            items,
            stats,
        })
    }
}
