//! crates/pantry_core/src/intake.rs
//!
//! Receipt intake staging. Extracted or hand-entered items sit in an editable
//! list, keyed by temporary UUIDs, until the user commits them to the pantry.
//! Nothing here touches the store before `commit`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Identity, Item, ItemDraft};
use crate::error::{PantryError, PantryResult};
use crate::lifecycle::recalculate_expiry;
use crate::store::PantryStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagedItem {
    /// Session-local id; never a persisted item id.
    pub temp_id: Uuid,
    #[serde(flatten)]
    pub draft: ItemDraft,
    pub purchase_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub days_left: Option<i64>,
}

impl StagedItem {
    fn new(draft: ItemDraft, purchase_date: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let mut staged = Self {
            temp_id: Uuid::new_v4(),
            draft,
            purchase_date,
            expiry_date: None,
            days_left: None,
        };
        staged.rederive(purchase_date, now);
        staged
    }

    fn rederive(&mut self, purchase_date: DateTime<Utc>, now: DateTime<Utc>) {
        self.purchase_date = purchase_date;
        if !self.draft.is_perishable {
            self.expiry_date = None;
            self.days_left = None;
            return;
        }
        let recalc = self
            .draft
            .expiry_days
            .map(|days| recalculate_expiry(purchase_date, days, now));
        self.expiry_date = recalc.and_then(|r| r.expiry_date);
        self.days_left = recalc.and_then(|r| r.days_left);
    }
}

pub fn stage(
    extracted: Vec<ItemDraft>,
    purchase_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<StagedItem> {
    extracted
        .into_iter()
        .map(|draft| StagedItem::new(draft, purchase_date, now))
        .collect()
}

/// Moves every staged item to a new purchase date. Perishable items get their
/// expiry re-derived; the rest only change `purchase_date`.
pub fn update_purchase_date_for_all(
    staged: Vec<StagedItem>,
    purchase_date: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Vec<StagedItem> {
    staged
        .into_iter()
        .map(|mut item| {
            item.rederive(purchase_date, now);
            item
        })
        .collect()
}

//=========================================================================================
// Staging reducer
//=========================================================================================

#[derive(Debug, Clone)]
pub enum StagingAction {
    /// Replaces the list with a freshly scanned receipt.
    Stage {
        items: Vec<ItemDraft>,
        purchase_date: DateTime<Utc>,
        store: Option<String>,
    },
    Add(ItemDraft),
    Edit { temp_id: Uuid, draft: ItemDraft },
    Remove(Uuid),
    SetPurchaseDate(DateTime<Utc>),
    Clear,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StagingList {
    pub store: Option<String>,
    pub purchase_date: DateTime<Utc>,
    pub items: Vec<StagedItem>,
}

impl StagingList {
    pub fn new(purchase_date: DateTime<Utc>) -> Self {
        Self {
            store: None,
            purchase_date,
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn reduce(&mut self, action: StagingAction, now: DateTime<Utc>) -> PantryResult<()> {
        match action {
            StagingAction::Stage {
                items,
                purchase_date,
                store,
            } => {
                self.store = store;
                self.purchase_date = purchase_date;
                self.items = stage(items, purchase_date, now);
            }
            StagingAction::Add(draft) => {
                self.items.push(StagedItem::new(draft, self.purchase_date, now));
            }
            StagingAction::Edit { temp_id, draft } => {
                let purchase_date = self.purchase_date;
                let item = self.find_mut(temp_id)?;
                item.draft = draft;
                item.rederive(purchase_date, now);
            }
            StagingAction::Remove(temp_id) => {
                let before = self.items.len();
                self.items.retain(|i| i.temp_id != temp_id);
                if self.items.len() == before {
                    return Err(not_staged(temp_id));
                }
            }
            StagingAction::SetPurchaseDate(purchase_date) => {
                self.purchase_date = purchase_date;
                self.items =
                    update_purchase_date_for_all(std::mem::take(&mut self.items), purchase_date, now);
            }
            StagingAction::Clear => {
                self.store = None;
                self.items.clear();
            }
        }
        Ok(())
    }

    fn find_mut(&mut self, temp_id: Uuid) -> PantryResult<&mut StagedItem> {
        self.items
            .iter_mut()
            .find(|i| i.temp_id == temp_id)
            .ok_or_else(|| not_staged(temp_id))
    }
}

fn not_staged(temp_id: Uuid) -> PantryError {
    PantryError::NotFound(format!("Staged item {} not found", temp_id))
}

/// Saves the staged items to the pantry and clears the list on success.
/// On failure the list is left untouched so the user can retry.
pub async fn commit(
    store: &PantryStore,
    identity: &Identity,
    list: &mut StagingList,
) -> PantryResult<Vec<Item>> {
    if list.is_empty() {
        return Err(PantryError::InvalidOperation("There are no items to save".to_string()));
    }
    let drafts: Vec<ItemDraft> = list.items.iter().map(|s| s.draft.clone()).collect();
    let saved = store.save_items(identity, list.purchase_date, drafts).await?;
    list.reduce(StagingAction::Clear, store.now())?;
    Ok(saved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn draft(name: &str, perishable: bool, days: Option<i64>) -> ItemDraft {
        ItemDraft {
            is_perishable: perishable,
            expiry_days: days,
            ..ItemDraft::new(name, Category::Other)
        }
    }

    #[test]
    fn stage_assigns_unique_temp_ids_and_expiry() {
        let now = at(2024, 1, 5);
        let staged = stage(
            vec![draft("Milk", true, Some(7)), draft("Rice", false, Some(365))],
            at(2024, 1, 1),
            now,
        );
        assert_ne!(staged[0].temp_id, staged[1].temp_id);
        assert_eq!(staged[0].expiry_date, Some(at(2024, 1, 8)));
        assert_eq!(staged[0].days_left, Some(3));
        assert_eq!(staged[1].expiry_date, None);
        assert_eq!(staged[1].days_left, None);
    }

    #[test]
    fn new_purchase_date_rederives_only_perishables() {
        let now = at(2024, 1, 5);
        let staged = stage(
            vec![draft("Milk", true, Some(7)), draft("Rice", false, None)],
            at(2024, 1, 1),
            now,
        );
        let moved = update_purchase_date_for_all(staged, at(2024, 1, 4), now);
        assert_eq!(moved[0].expiry_date, Some(at(2024, 1, 11)));
        assert_eq!(moved[0].days_left, Some(6));
        assert_eq!(moved[1].purchase_date, at(2024, 1, 4));
        assert_eq!(moved[1].expiry_date, None);
    }

    #[test]
    fn reducer_edits_and_removes_by_temp_id() {
        let now = at(2024, 1, 5);
        let mut list = StagingList::new(at(2024, 1, 1));
        list.reduce(StagingAction::Add(draft("Bread", true, Some(3))), now).unwrap();
        list.reduce(StagingAction::Add(draft("Eggs", true, Some(21))), now).unwrap();
        let bread = list.items[0].temp_id;

        list.reduce(
            StagingAction::Edit {
                temp_id: bread,
                draft: draft("Sourdough", true, Some(5)),
            },
            now,
        )
        .unwrap();
        assert_eq!(list.items[0].draft.name, "Sourdough");
        assert_eq!(list.items[0].days_left, Some(1));

        list.reduce(StagingAction::Remove(bread), now).unwrap();
        assert_eq!(list.items.len(), 1);
        assert!(matches!(
            list.reduce(StagingAction::Remove(bread), now),
            Err(PantryError::NotFound(_))
        ));
    }

    #[test]
    fn stage_action_replaces_previous_receipt() {
        let now = at(2024, 1, 5);
        let mut list = StagingList::new(now);
        list.reduce(StagingAction::Add(draft("Old", true, None)), now).unwrap();
        list.reduce(
            StagingAction::Stage {
                items: vec![draft("Apples", true, Some(14))],
                purchase_date: at(2024, 1, 2),
                store: Some("Corner Grocer".into()),
            },
            now,
        )
        .unwrap();
        assert_eq!(list.items.len(), 1);
        assert_eq!(list.items[0].draft.name, "Apples");
        assert_eq!(list.purchase_date, at(2024, 1, 2));
        assert_eq!(list.store.as_deref(), Some("Corner Grocer"));
    }
}
