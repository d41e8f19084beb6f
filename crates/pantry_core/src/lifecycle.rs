//! crates/pantry_core/src/lifecycle.rs
//!
//! The item lifecycle engine: pure functions that turn stored items into the
//! view-ready shape against a reference "now", and derive the dashboard
//! buckets and statistics from them.
//!
//! Nothing in here fails on malformed input. Coercion problems are logged and
//! replaced with a documented default; only `use_item` reports an error.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::domain::{Category, Item, RawItem};
use crate::error::{PantryError, PantryResult, ValidationError};

/// Milliseconds in one day. All day arithmetic is done on raw millisecond
/// differences, not calendar days.
pub const DAY_MS: i64 = 86_400_000;

/// Items with this many days left or fewer show up in the expiring bucket.
pub const EXPIRING_SOON_DAYS: i64 = 3;
/// Items with this many days left or fewer match the `expiring` filter.
pub const EXPIRING_FILTER_DAYS: i64 = 7;
/// Items purchased within this many days show up in the recent bucket.
pub const RECENT_DAYS: i64 = 7;

//=========================================================================================
// Day arithmetic
//=========================================================================================

/// `Math.ceil(n / d)` on integers, for `d > 0`.
fn ceil_div(n: i64, d: i64) -> i64 {
    let q = n.div_euclid(d);
    if n.rem_euclid(d) == 0 {
        q
    } else {
        q + 1
    }
}

/// `Math.round(ms / DAY_MS)`: halves round toward positive infinity.
fn round_days(ms: i64) -> i64 {
    (ms as f64 / DAY_MS as f64 + 0.5).floor() as i64
}

/// Whole days from `now` until `expiry_date`, rounded up. Negative once expired.
pub fn days_left(expiry_date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    expiry_date.map(|expiry| ceil_div(expiry.timestamp_millis() - now.timestamp_millis(), DAY_MS))
}

/// Whole days since `purchase_date`, rounded up.
pub fn days_since(purchase_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    ceil_div(now.timestamp_millis() - purchase_date.timestamp_millis(), DAY_MS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryRecalc {
    pub expiry_date: Option<DateTime<Utc>>,
    pub days_left: Option<i64>,
}

/// Derives the expiry date and countdown after an edit to the purchase date or
/// the expiry-days field. An offset too large to represent yields no expiry.
pub fn recalculate_expiry(
    purchase_date: DateTime<Utc>,
    expiry_days: i64,
    now: DateTime<Utc>,
) -> ExpiryRecalc {
    let expiry_date = Duration::try_days(expiry_days)
        .and_then(|offset| purchase_date.checked_add_signed(offset));
    ExpiryRecalc {
        expiry_date,
        days_left: days_left(expiry_date, now),
    }
}

/// The inverse of `recalculate_expiry`, used when the expiry date is edited directly.
pub fn expiry_days_between(purchase_date: DateTime<Utc>, expiry_date: DateTime<Utc>) -> i64 {
    round_days(expiry_date.timestamp_millis() - purchase_date.timestamp_millis())
}

//=========================================================================================
// Coercion
//=========================================================================================

/// Accepts RFC 3339 timestamps, `YYYY-MM-DD` dates (midnight UTC), naive
/// `YYYY-MM-DDTHH:MM:SS` timestamps (UTC) and epoch milliseconds.
pub fn parse_date(value: &Value) -> Result<DateTime<Utc>, ValidationError> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Ok(naive.and_utc());
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
                .ok_or_else(|| ValidationError::new("date", format!("unrecognised date '{}'", s)))
        }
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| ValidationError::new("date", format!("timestamp {} out of range", n))),
        other => Err(ValidationError::new("date", format!("expected a date, got {}", other))),
    }
}

fn parse_number(field: &'static str, value: &Value) -> Result<f64, ValidationError> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    n.filter(|n| n.is_finite())
        .ok_or_else(|| ValidationError::new(field, format!("expected a number, got {}", value)))
}

/// Non-negative quantity; fractions round to the nearest whole unit.
pub fn parse_quantity(value: &Value) -> Result<u32, ValidationError> {
    let n = parse_number("quantity", value)?;
    if n < 0.0 {
        return Err(ValidationError::new("quantity", format!("{} is negative", n)));
    }
    Ok(n.round().min(u32::MAX as f64) as u32)
}

pub fn parse_days(value: &Value) -> Result<i64, ValidationError> {
    parse_number("expiryDays", value).map(|n| n.round() as i64)
}

fn parse_bool(field: &'static str, value: &Value) -> Result<bool, ValidationError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(ValidationError::new(field, format!("expected a boolean, got {}", other))),
    }
}

fn display_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

/// Applies `parse` to an optional field, substituting `default` when the field
/// is missing or malformed. Malformed input is logged, missing input is not.
fn coerce<T>(
    item_id: Option<u64>,
    value: Option<&Value>,
    parse: impl FnOnce(&Value) -> Result<T, ValidationError>,
    default: impl FnOnce() -> T,
) -> T {
    match value {
        None | Some(Value::Null) => default(),
        Some(v) => parse(v).unwrap_or_else(|e| {
            warn!(?item_id, "{}; using default", e);
            default()
        }),
    }
}

//=========================================================================================
// Normalization
//=========================================================================================

/// Coerces a stored item into a valid `Item`, recomputing `days_left` against `now`.
pub fn normalize(raw: &RawItem, now: DateTime<Utc>) -> Item {
    let id = raw.id;
    if id.is_none() {
        warn!("Stored item has no id; using 0");
    }

    let name = raw.name.as_ref().and_then(display_string).unwrap_or_default();
    let category = match raw.category.as_ref() {
        Some(Value::String(s)) => s.parse().unwrap_or_else(|e| {
            debug!(?id, "{}; filing as uncategorized", e);
            Category::Uncategorized
        }),
        _ => Category::Uncategorized,
    };
    let quantity = coerce(id, raw.quantity.as_ref(), parse_quantity, || 1);
    let price = raw.price.as_ref().and_then(display_string).unwrap_or_default();
    let is_perishable = coerce(id, raw.is_perishable.as_ref(), |v| parse_bool("isPerishable", v), || true);
    let purchase_date = coerce(id, raw.purchase_date.as_ref(), parse_date, || now);
    let expiry_date = coerce(id, raw.expiry_date.as_ref(), |v| parse_date(v).map(Some), || None);
    let expiry_days = coerce(id, raw.expiry_days.as_ref(), |v| parse_days(v).map(Some), || None)
        .or_else(|| expiry_date.map(|e| expiry_days_between(purchase_date, e)));
    let saved = coerce(id, raw.saved.as_ref(), |v| parse_bool("saved", v), || false);

    let (expiry_date, days_left) = if is_perishable {
        (expiry_date, days_left(expiry_date, now))
    } else {
        (None, None)
    };

    Item {
        id: id.unwrap_or(0),
        name,
        category,
        quantity,
        price,
        is_perishable,
        purchase_date,
        expiry_days,
        expiry_date,
        days_left,
        saved,
    }
}

/// Backends repair missing ids on load, so an id-less document here can not
/// be addressed by any operation; it is left out rather than shown as id 0.
pub fn normalize_all(raw: &[RawItem], now: DateTime<Utc>) -> Vec<Item> {
    raw.iter()
        .filter(|r| r.id.is_some())
        .map(|r| normalize(r, now))
        .collect()
}

//=========================================================================================
// Classification
//=========================================================================================

/// Perishable items with at most `EXPIRING_SOON_DAYS` left, unsaved first, then
/// soonest first.
pub fn classify_expiring(items: &[Item]) -> Vec<Item> {
    let mut expiring: Vec<Item> = items
        .iter()
        .filter(|i| i.is_perishable && i.days_left.is_some_and(|d| d <= EXPIRING_SOON_DAYS))
        .cloned()
        .collect();
    expiring.sort_by(|a, b| a.saved.cmp(&b.saved).then(a.days_left.cmp(&b.days_left)));
    expiring
}

/// Items purchased within the last `RECENT_DAYS`, unsaved first, then newest first.
pub fn classify_recent(items: &[Item], now: DateTime<Utc>) -> Vec<Item> {
    let mut recent: Vec<Item> = items
        .iter()
        .filter(|i| days_since(i.purchase_date, now) <= RECENT_DAYS)
        .cloned()
        .collect();
    recent.sort_by(|a, b| a.saved.cmp(&b.saved).then(b.purchase_date.cmp(&a.purchase_date)));
    recent
}

pub fn classify_saved(items: &[Item]) -> Vec<Item> {
    items.iter().filter(|i| i.saved).cloned().collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PantryStats {
    pub total: usize,
    /// Number of distinct categories present.
    pub categories: usize,
    pub saved: usize,
}

pub fn aggregate_stats(items: &[Item]) -> PantryStats {
    let categories: HashSet<Category> = items.iter().map(|i| i.category).collect();
    PantryStats {
        total: items.len(),
        categories: categories.len(),
        saved: items.iter().filter(|i| i.saved).count(),
    }
}

/// Everything the dashboard shows, derived from one fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub expiring: Vec<Item>,
    pub recent: Vec<Item>,
    pub saved: Vec<Item>,
    pub stats: PantryStats,
}

pub fn dashboard(items: &[Item], now: DateTime<Utc>) -> Dashboard {
    Dashboard {
        expiring: classify_expiring(items),
        recent: classify_recent(items, now),
        saved: classify_saved(items),
        stats: aggregate_stats(items),
    }
}

//=========================================================================================
// Filtering
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFilter {
    All,
    Expiring,
    Expired,
    Perishable,
    NonPerishable,
    Saved,
    Category(Category),
}

impl ItemFilter {
    /// Unknown keys select everything.
    pub fn from_key(key: &str) -> Self {
        match key {
            "all" => ItemFilter::All,
            "expiring" => ItemFilter::Expiring,
            "expired" => ItemFilter::Expired,
            "perishable" => ItemFilter::Perishable,
            "non-perishable" => ItemFilter::NonPerishable,
            "saved" => ItemFilter::Saved,
            other => other.parse().map(ItemFilter::Category).unwrap_or_else(|_| {
                debug!(filter = other, "Unknown filter key; showing all items");
                ItemFilter::All
            }),
        }
    }

    pub fn matches(&self, item: &Item) -> bool {
        match self {
            ItemFilter::All => true,
            ItemFilter::Expiring => {
                item.is_perishable && item.days_left.is_some_and(|d| d <= EXPIRING_FILTER_DAYS)
            }
            ItemFilter::Expired => item.is_perishable && item.days_left.is_some_and(|d| d < 0),
            ItemFilter::Perishable => item.is_perishable,
            ItemFilter::NonPerishable => !item.is_perishable,
            ItemFilter::Saved => item.saved,
            ItemFilter::Category(category) => item.category == *category,
        }
    }
}

pub fn apply_filter(items: &[Item], filter_key: &str) -> Vec<Item> {
    let filter = ItemFilter::from_key(filter_key);
    items.iter().filter(|i| filter.matches(i)).cloned().collect()
}

//=========================================================================================
// Consumption
//=========================================================================================

/// Consumes one unit. Reaching zero marks the item saved from waste.
pub fn use_item(item: &Item) -> PantryResult<Item> {
    if item.saved {
        return Err(PantryError::InvalidOperation(format!(
            "'{}' has already been used up",
            item.name
        )));
    }
    if item.quantity == 0 {
        return Err(PantryError::InvalidOperation(format!(
            "'{}' has no quantity left to use",
            item.name
        )));
    }

    let mut updated = item.clone();
    updated.quantity -= 1;
    if updated.quantity == 0 {
        updated.saved = true;
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn item(id: u64, days_left: Option<i64>, perishable: bool, saved: bool) -> Item {
        Item {
            id,
            name: format!("item-{}", id),
            category: Category::Produce,
            quantity: 1,
            price: String::new(),
            is_perishable: perishable,
            purchase_date: at(2024, 1, 1),
            expiry_days: None,
            expiry_date: None,
            days_left,
            saved,
        }
    }

    #[test]
    fn days_left_uses_ceiling_of_millisecond_difference() {
        let now = at(2024, 1, 5);
        assert_eq!(days_left(None, now), None);
        assert_eq!(days_left(Some(at(2024, 1, 8)), now), Some(3));
        assert_eq!(days_left(Some(now + Duration::hours(1)), now), Some(1));
        assert_eq!(days_left(Some(now - Duration::hours(1)), now), Some(0));
        assert_eq!(days_left(Some(now - Duration::hours(36)), now), Some(-1));
        assert_eq!(days_left(Some(now - Duration::days(2)), now), Some(-2));
    }

    #[test]
    fn purchase_plus_seven_days_expires_on_the_eighth() {
        let r = recalculate_expiry(at(2024, 1, 1), 7, at(2024, 1, 5));
        assert_eq!(r.expiry_date, Some(at(2024, 1, 8)));
        assert_eq!(r.days_left, Some(3));
    }

    #[test]
    fn expiry_days_round_trip_through_expiry_date() {
        let purchase = Utc.with_ymd_and_hms(2024, 3, 9, 17, 42, 5).unwrap();
        let now = at(2024, 3, 20);
        for d in [0, 1, 2, 7, 30, 365, 1000] {
            let expiry = recalculate_expiry(purchase, d, now).expiry_date.unwrap();
            assert_eq!(expiry_days_between(purchase, expiry), d);
        }
    }

    #[test]
    fn expiry_days_between_rounds_halves_up() {
        let p = at(2024, 1, 1);
        assert_eq!(expiry_days_between(p, p + Duration::hours(36)), 2);
        assert_eq!(expiry_days_between(p, p - Duration::hours(36)), -1);
        assert_eq!(expiry_days_between(p, p + Duration::hours(11)), 0);
    }

    #[test]
    fn normalize_substitutes_defaults_for_garbage() {
        let now = at(2024, 6, 1);
        let raw: RawItem = serde_json::from_value(json!({
            "id": 3,
            "name": "Yogurt",
            "quantity": "-2",
            "purchaseDate": "last tuesday",
            "expiryDate": {"nested": true},
        }))
        .unwrap();
        let item = normalize(&raw, now);
        assert_eq!(item.quantity, 1);
        assert_eq!(item.purchase_date, now);
        assert_eq!(item.expiry_date, None);
        assert_eq!(item.days_left, None);
        assert!(item.is_perishable);
        assert!(!item.saved);
        assert_eq!(item.category, Category::Uncategorized);
    }

    #[test]
    fn normalize_handles_an_empty_document() {
        let now = at(2024, 6, 1);
        let item = normalize(&RawItem::default(), now);
        assert_eq!(item.id, 0);
        assert_eq!(item.quantity, 1);
        assert_eq!(item.purchase_date, now);
        assert_eq!(item.expiry_days, None);
    }

    #[test]
    fn normalize_all_leaves_out_unaddressable_documents() {
        let now = at(2024, 6, 1);
        let raw: Vec<RawItem> = serde_json::from_value(json!([
            {"id": 1, "name": "Milk"},
            {"name": "legacy"},
            {"name": "older legacy"},
        ]))
        .unwrap();
        let items = normalize_all(&raw, now);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 1);
    }

    #[test]
    fn normalize_coerces_string_fields() {
        let now = at(2024, 1, 5);
        let raw: RawItem = serde_json::from_value(json!({
            "id": 9,
            "name": "Milk",
            "category": "dairy",
            "quantity": "2.4",
            "price": 3.5,
            "isPerishable": "true",
            "purchaseDate": "2024-01-01",
            "expiryDate": "2024-01-08T00:00:00Z",
            "daysLeft": 100,
            "saved": "false",
        }))
        .unwrap();
        let item = normalize(&raw, now);
        assert_eq!(item.category, Category::Dairy);
        assert_eq!(item.quantity, 2);
        assert_eq!(item.price, "3.5");
        assert_eq!(item.expiry_days, Some(7));
        assert_eq!(item.days_left, Some(3));
    }

    #[test]
    fn non_perishable_items_never_carry_a_countdown() {
        let now = at(2024, 1, 5);
        let raw: RawItem = serde_json::from_value(json!({
            "id": 1,
            "isPerishable": false,
            "purchaseDate": "2023-01-01",
            "expiryDate": "2023-02-01",
        }))
        .unwrap();
        let item = normalize(&raw, now);
        assert_eq!(item.days_left, None);
        assert_eq!(item.expiry_date, None);
        let items = vec![item];
        assert!(apply_filter(&items, "expired").is_empty());
        assert!(apply_filter(&items, "expiring").is_empty());
        assert_eq!(apply_filter(&items, "non-perishable").len(), 1);
    }

    #[test]
    fn expiring_keeps_items_within_three_days_ordered() {
        let items = vec![
            item(1, Some(1), true, false),
            item(2, Some(5), true, false),
            item(3, Some(2), true, false),
            item(4, None, false, false),
        ];
        let ids: Vec<u64> = classify_expiring(&items).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn expiring_puts_saved_items_last() {
        let items = vec![
            item(1, Some(-4), true, true),
            item(2, Some(3), true, false),
            item(3, Some(0), true, false),
        ];
        let ids: Vec<u64> = classify_expiring(&items).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn recent_covers_last_seven_days_newest_first() {
        let now = at(2024, 1, 10);
        let mut a = item(1, None, true, false);
        a.purchase_date = at(2024, 1, 3);
        let mut b = item(2, None, true, false);
        b.purchase_date = at(2024, 1, 2) + Duration::hours(1);
        let mut c = item(3, None, true, false);
        c.purchase_date = at(2024, 1, 9);
        let mut d = item(4, None, true, true);
        d.purchase_date = at(2024, 1, 10);
        let ids: Vec<u64> = classify_recent(&[a, b, c, d], now).iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3, 1, 4]);
    }

    #[test]
    fn stats_count_distinct_categories_and_saved() {
        let mut a = item(1, None, true, true);
        a.category = Category::Dairy;
        let b = item(2, None, true, false);
        let c = item(3, None, true, true);
        let stats = aggregate_stats(&[a.clone(), b, c]);
        assert_eq!(stats, PantryStats { total: 3, categories: 2, saved: 2 });
        assert_eq!(classify_saved(&[a]).len(), 1);
    }

    #[test]
    fn filter_keys() {
        let mut dairy = item(1, Some(-1), true, false);
        dairy.category = Category::Dairy;
        let items = vec![dairy, item(2, Some(6), true, true), item(3, Some(9), true, false)];
        let ids = |key: &str| apply_filter(&items, key).iter().map(|i| i.id).collect::<Vec<_>>();
        assert_eq!(ids("all"), vec![1, 2, 3]);
        assert_eq!(ids("expiring"), vec![1, 2]);
        assert_eq!(ids("expired"), vec![1]);
        assert_eq!(ids("saved"), vec![2]);
        assert_eq!(ids("dairy"), vec![1]);
        assert_eq!(ids("frozen"), Vec::<u64>::new());
        assert_eq!(ids("no-such-filter"), vec![1, 2, 3]);
    }

    #[test]
    fn use_item_decrements_and_saves_at_zero() {
        let mut one = item(1, Some(2), true, false);
        one.quantity = 1;
        let used = use_item(&one).unwrap();
        assert_eq!(used.quantity, 0);
        assert!(used.saved);

        let mut three = item(2, Some(2), true, false);
        three.quantity = 3;
        let used = use_item(&three).unwrap();
        assert_eq!(used.quantity, 2);
        assert!(!used.saved);
    }

    #[test]
    fn use_item_rejects_exhausted_or_saved_items() {
        let mut empty = item(1, Some(2), true, false);
        empty.quantity = 0;
        assert!(matches!(use_item(&empty), Err(PantryError::InvalidOperation(_))));

        let saved = item(2, Some(2), true, true);
        assert!(matches!(use_item(&saved), Err(PantryError::InvalidOperation(_))));
    }

    #[test]
    fn parse_date_accepts_epoch_millis() {
        let d = parse_date(&json!(1_704_067_200_000i64)).unwrap();
        assert_eq!(d, at(2024, 1, 1));
        assert!(parse_date(&json!(true)).is_err());
    }
}
