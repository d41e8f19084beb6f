//! crates/pantry_core/src/editor.rs
//!
//! The item-editing reducer. An edit is a list of explicit actions applied in
//! order; each one keeps the expiry fields consistent with the others.

use chrono::{DateTime, Utc};

use crate::domain::{Category, Item};
use crate::lifecycle::{days_left, expiry_days_between, recalculate_expiry};

#[derive(Debug, Clone, PartialEq)]
pub enum ItemEdit {
    SetName(String),
    SetCategory(Category),
    SetQuantity(u32),
    SetPrice(String),
    SetPerishable(bool),
    /// Moves the purchase date; the expiry date follows, keeping `expiry_days`.
    SetPurchaseDate(DateTime<Utc>),
    SetExpiryDays(i64),
    /// Sets the expiry date directly; `expiry_days` is derived back from it.
    SetExpiryDate(Option<DateTime<Utc>>),
}

pub fn apply_edit(mut item: Item, edit: ItemEdit, now: DateTime<Utc>) -> Item {
    match edit {
        ItemEdit::SetName(name) => item.name = name,
        ItemEdit::SetCategory(category) => item.category = category,
        ItemEdit::SetQuantity(quantity) => item.quantity = quantity,
        ItemEdit::SetPrice(price) => item.price = price,
        ItemEdit::SetPerishable(is_perishable) => {
            item.is_perishable = is_perishable;
            refresh_expiry(&mut item, now);
        }
        ItemEdit::SetPurchaseDate(purchase_date) => {
            item.purchase_date = purchase_date;
            refresh_expiry(&mut item, now);
        }
        ItemEdit::SetExpiryDays(expiry_days) => {
            item.expiry_days = Some(expiry_days);
            refresh_expiry(&mut item, now);
        }
        ItemEdit::SetExpiryDate(expiry_date) => {
            item.expiry_days = expiry_date.map(|e| expiry_days_between(item.purchase_date, e));
            if item.is_perishable {
                item.expiry_date = expiry_date;
                item.days_left = days_left(expiry_date, now);
            }
        }
    }
    item
}

pub fn apply_edits(item: Item, edits: impl IntoIterator<Item = ItemEdit>, now: DateTime<Utc>) -> Item {
    edits.into_iter().fold(item, |item, edit| apply_edit(item, edit, now))
}

/// Re-derives `expiry_date`/`days_left` from `purchase_date + expiry_days`.
/// Non-perishable items carry neither.
fn refresh_expiry(item: &mut Item, now: DateTime<Utc>) {
    if !item.is_perishable {
        item.expiry_date = None;
        item.days_left = None;
        return;
    }
    if let Some(days) = item.expiry_days {
        let recalc = recalculate_expiry(item.purchase_date, days, now);
        item.expiry_date = recalc.expiry_date;
        item.days_left = recalc.days_left;
    }
}
