//! crates/pantry_core/src/domain.rs
//!
//! Defines the core data structures for the pantry.
//! `RawItem` is the loosely-typed persisted shape; `Item` is the normalized,
//! view-ready shape produced by the lifecycle engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Per-user item identifier, allocated from the user's `next_item_id` counter.
pub type ItemId = u64;

//=========================================================================================
// Categories
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Dairy,
    Meat,
    Produce,
    Bakery,
    Pantry,
    Frozen,
    Canned,
    Snacks,
    Beverages,
    Toiletries,
    Household,
    Pet,
    Other,
    Uncategorized,
}

impl Category {
    pub const ALL: [Category; 14] = [
        Category::Dairy,
        Category::Meat,
        Category::Produce,
        Category::Bakery,
        Category::Pantry,
        Category::Frozen,
        Category::Canned,
        Category::Snacks,
        Category::Beverages,
        Category::Toiletries,
        Category::Household,
        Category::Pet,
        Category::Other,
        Category::Uncategorized,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Dairy => "dairy",
            Category::Meat => "meat",
            Category::Produce => "produce",
            Category::Bakery => "bakery",
            Category::Pantry => "pantry",
            Category::Frozen => "frozen",
            Category::Canned => "canned",
            Category::Snacks => "snacks",
            Category::Beverages => "beverages",
            Category::Toiletries => "toiletries",
            Category::Household => "household",
            Category::Pet => "pet",
            Category::Other => "other",
            Category::Uncategorized => "uncategorized",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    /// Exact, case-sensitive match against the lowercase category keys.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

//=========================================================================================
// Items
//=========================================================================================

/// An item exactly as it sits in a pantry document.
///
/// Every field is optional and most are untyped JSON, because documents may
/// have been written by older clients that stored quantities and dates as
/// strings. `lifecycle::normalize` turns this into an `Item`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    #[serde(default)]
    pub name: Option<Value>,
    #[serde(default)]
    pub category: Option<Value>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub is_perishable: Option<Value>,
    #[serde(default)]
    pub purchase_date: Option<Value>,
    #[serde(default)]
    pub expiry_days: Option<Value>,
    #[serde(default)]
    pub expiry_date: Option<Value>,
    #[serde(default)]
    pub days_left: Option<Value>,
    #[serde(default)]
    pub saved: Option<Value>,
}

/// A normalized, view-ready item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub category: Category,
    pub quantity: u32,
    pub price: String,
    pub is_perishable: bool,
    pub purchase_date: DateTime<Utc>,
    pub expiry_days: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    /// Derived on every load; never authoritative.
    pub days_left: Option<i64>,
    pub saved: bool,
}

impl Item {
    /// Converts back into the persisted document shape.
    pub fn to_raw(&self) -> RawItem {
        RawItem {
            id: Some(self.id),
            name: Some(Value::from(self.name.clone())),
            category: Some(Value::from(self.category.as_str())),
            quantity: Some(Value::from(self.quantity)),
            price: Some(Value::from(self.price.clone())),
            is_perishable: Some(Value::from(self.is_perishable)),
            purchase_date: Some(Value::from(self.purchase_date.to_rfc3339())),
            expiry_days: self.expiry_days.map(Value::from),
            expiry_date: self.expiry_date.map(|d| Value::from(d.to_rfc3339())),
            days_left: self.days_left.map(Value::from),
            saved: Some(Value::from(self.saved)),
        }
    }
}

/// An item that has not been assigned an id yet: a staged receipt line or a
/// manual "Add Item" entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub name: String,
    pub category: Category,
    pub quantity: u32,
    pub price: String,
    pub is_perishable: bool,
    pub expiry_days: Option<i64>,
}

impl ItemDraft {
    pub fn new(name: impl Into<String>, category: Category) -> Self {
        Self {
            name: name.into(),
            category,
            quantity: 1,
            price: String::new(),
            is_perishable: true,
            expiry_days: None,
        }
    }
}

/// Gives every id-less document a fresh id, starting at `next_item_id` or past
/// the highest id already present, whichever is larger. Returns the counter
/// value to store next; unchanged when nothing needed repair.
pub fn repair_item_ids(items: &mut [RawItem], next_item_id: ItemId) -> ItemId {
    if items.iter().all(|i| i.id.is_some()) {
        return next_item_id;
    }
    let highest = items.iter().filter_map(|i| i.id).max().unwrap_or(0);
    let mut next = next_item_id.max(highest + 1);
    for item in items.iter_mut().filter(|i| i.id.is_none()) {
        item.id = Some(next);
        next += 1;
    }
    next
}

//=========================================================================================
// Users and identity
//=========================================================================================

/// The per-user record holding the pantry counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub item_cardinality: u64,
    pub next_item_id: ItemId,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(identity: &Identity, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: identity.user_id,
            name: identity.name.clone(),
            email: identity.email.clone(),
            item_cardinality: 0,
            next_item_id: 1,
            created_at,
        }
    }
}

/// A signed-in user as seen by every store and engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

// Only used internally for login - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub identity: Identity,
    pub hashed_password: String,
}

/// Profile asserted by an external sign-in provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderProfile {
    pub provider: String,
    pub subject: String,
    pub email: String,
    pub name: String,
}

//=========================================================================================
// Receipts
//=========================================================================================

/// One line extracted from a receipt image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub name: String,
    pub price: String,
}

/// The result of running a receipt image through the OCR collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedReceipt {
    pub store: String,
    pub date: Option<String>,
    pub items: Vec<ReceiptLine>,
}

/// Estimated shelf life for a product name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShelfLife {
    pub category: Category,
    pub is_perishable: bool,
    pub expiry_days: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with_id(id: Option<ItemId>) -> RawItem {
        RawItem {
            id,
            ..RawItem::default()
        }
    }

    #[test]
    fn id_less_documents_get_fresh_unique_ids() {
        let mut items = vec![raw_with_id(Some(7)), raw_with_id(None), raw_with_id(None)];
        let next = repair_item_ids(&mut items, 4);
        let ids: Vec<_> = items.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![Some(7), Some(8), Some(9)]);
        assert_eq!(next, 10);

        let mut intact = vec![raw_with_id(Some(1))];
        assert_eq!(repair_item_ids(&mut intact, 5), 5);
    }

    #[test]
    fn category_parses_exact_keys_only() {
        assert_eq!("dairy".parse::<Category>(), Ok(Category::Dairy));
        assert_eq!("uncategorized".parse::<Category>(), Ok(Category::Uncategorized));
        assert!("Dairy".parse::<Category>().is_err());
        assert!("expiring".parse::<Category>().is_err());
    }

    #[test]
    fn raw_item_accepts_stringly_typed_documents() {
        let raw: RawItem = serde_json::from_str(
            r#"{"id":4,"name":"Milk","quantity":"2","isPerishable":"yes","purchaseDate":12}"#,
        )
        .unwrap();
        assert_eq!(raw.id, Some(4));
        assert_eq!(raw.quantity, Some(Value::from("2")));
        assert_eq!(raw.expiry_date, None);
    }
}
