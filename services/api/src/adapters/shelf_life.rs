//! services/api/src/adapters/shelf_life.rs
//!
//! A hard-coded shelf-life table implementing the `ShelfLifeLookup` port.
//! Product names are matched by keyword, first match wins.

use async_trait::async_trait;
use pantry_core::{Category, PortResult, ShelfLife, ShelfLifeLookup};

/// Shelf life assumed for names that match nothing in the table.
const DEFAULT_EXPIRY_DAYS: i64 = 7;

const TABLE: &[(&str, Category, Option<i64>)] = &[
    ("milk", Category::Dairy, Some(7)),
    ("yogurt", Category::Dairy, Some(14)),
    ("cheese", Category::Dairy, Some(21)),
    ("butter", Category::Dairy, Some(30)),
    ("egg", Category::Dairy, Some(21)),
    ("chicken", Category::Meat, Some(2)),
    ("beef", Category::Meat, Some(3)),
    ("pork", Category::Meat, Some(3)),
    ("fish", Category::Meat, Some(2)),
    ("banana", Category::Produce, Some(5)),
    ("apple", Category::Produce, Some(30)),
    ("lettuce", Category::Produce, Some(7)),
    ("spinach", Category::Produce, Some(5)),
    ("tomato", Category::Produce, Some(7)),
    ("berries", Category::Produce, Some(4)),
    ("bread", Category::Bakery, Some(5)),
    ("bagel", Category::Bakery, Some(5)),
    ("frozen", Category::Frozen, Some(180)),
    ("ice cream", Category::Frozen, Some(60)),
    ("juice", Category::Beverages, Some(10)),
    ("soda", Category::Beverages, None),
    ("water", Category::Beverages, None),
    ("rice", Category::Pantry, None),
    ("pasta", Category::Pantry, None),
    ("flour", Category::Pantry, None),
    ("cereal", Category::Pantry, None),
    ("soup", Category::Canned, None),
    ("beans", Category::Canned, None),
    ("chips", Category::Snacks, None),
    ("cookies", Category::Snacks, None),
    ("soap", Category::Toiletries, None),
    ("shampoo", Category::Toiletries, None),
    ("toothpaste", Category::Toiletries, None),
    ("paper towel", Category::Household, None),
    ("detergent", Category::Household, None),
    ("dog food", Category::Pet, None),
    ("cat food", Category::Pet, None),
];

pub fn lookup(name: &str) -> ShelfLife {
    let name = name.to_lowercase();
    TABLE
        .iter()
        .find(|(keyword, _, _)| name.contains(keyword))
        .map(|&(_, category, expiry_days)| ShelfLife {
            category,
            is_perishable: expiry_days.is_some(),
            expiry_days,
        })
        .unwrap_or(ShelfLife {
            category: Category::Uncategorized,
            is_perishable: true,
            expiry_days: Some(DEFAULT_EXPIRY_DAYS),
        })
}

#[derive(Clone, Default)]
pub struct SampleShelfLife;

#[async_trait]
impl ShelfLifeLookup for SampleShelfLife {
    async fn estimate(&self, name: &str) -> PortResult<ShelfLife> {
        Ok(lookup(name))
    }
}
