//! services/api/src/web/items.rs
//!
//! Pantry endpoints for the dashboard and item management views. Every
//! mutating endpoint answers with the refreshed item list so the client never
//! shows state older than the store's.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use pantry_core::editor::{apply_edits, ItemEdit};
use pantry_core::lifecycle::{self, Dashboard, PantryStats};
use pantry_core::{Category, Identity, Item, ItemDraft, ItemId, PantryError, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::web::rest::{reject, HttpError};
use crate::web::state::AppState;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemResponse {
    pub id: u64,
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub price: String,
    pub is_perishable: bool,
    pub purchase_date: DateTime<Utc>,
    pub expiry_days: Option<i64>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub days_left: Option<i64>,
    pub saved: bool,
}

impl From<Item> for ItemResponse {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            name: item.name,
            category: item.category.to_string(),
            quantity: item.quantity,
            price: item.price,
            is_perishable: item.is_perishable,
            purchase_date: item.purchase_date,
            expiry_days: item.expiry_days,
            expiry_date: item.expiry_date,
            days_left: item.days_left,
            saved: item.saved,
        }
    }
}

pub fn item_responses(items: Vec<Item>) -> Vec<ItemResponse> {
    items.into_iter().map(ItemResponse::from).collect()
}

#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    pub total: usize,
    pub categories: usize,
    pub saved: usize,
}

impl From<PantryStats> for StatsResponse {
    fn from(stats: PantryStats) -> Self {
        Self {
            total: stats.total,
            categories: stats.categories,
            saved: stats.saved,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub expiring: Vec<ItemResponse>,
    pub recent: Vec<ItemResponse>,
    pub saved: Vec<ItemResponse>,
    pub stats: StatsResponse,
}

impl From<Dashboard> for DashboardResponse {
    fn from(d: Dashboard) -> Self {
        Self {
            expiring: item_responses(d.expiring),
            recent: item_responses(d.recent),
            saved: item_responses(d.saved),
            stats: d.stats.into(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct DeleteAllResponse {
    pub success: bool,
    pub deleted: usize,
    pub message: String,
    pub items: Vec<ItemResponse>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UseItemResponse {
    pub item: ItemResponse,
    pub newly_saved: bool,
    pub items: Vec<ItemResponse>,
    pub stats: StatsResponse,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub item_cardinality: u64,
    pub next_item_id: u64,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            name: u.name,
            email: u.email,
            item_cardinality: u.item_cardinality,
            next_item_id: u.next_item_id,
            created_at: u.created_at,
        }
    }
}

/// A new item, either added to the pantry or to the staging list.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemInput {
    pub name: String,
    pub category: Option<String>,
    pub quantity: Option<u32>,
    pub price: Option<String>,
    pub is_perishable: Option<bool>,
    pub expiry_days: Option<i64>,
    /// Ignored for staged items, which share the receipt's purchase date.
    pub purchase_date: Option<DateTime<Utc>>,
}

/// Unknown categories are filed as uncategorized.
fn category_or_default(category: Option<&str>) -> Category {
    category
        .and_then(|c| c.parse().ok())
        .unwrap_or(Category::Uncategorized)
}

impl ItemInput {
    pub fn to_draft(&self) -> ItemDraft {
        ItemDraft {
            name: self.name.trim().to_string(),
            category: category_or_default(self.category.as_deref()),
            quantity: self.quantity.unwrap_or(1),
            price: self.price.clone().unwrap_or_default(),
            is_perishable: self.is_perishable.unwrap_or(true),
            expiry_days: self.expiry_days,
        }
    }
}

/// A partial edit; only the fields present are changed.
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemPatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub quantity: Option<u32>,
    pub price: Option<String>,
    pub is_perishable: Option<bool>,
    pub purchase_date: Option<DateTime<Utc>>,
    pub expiry_days: Option<i64>,
    /// Absent leaves the date alone; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub expiry_date: Option<Option<DateTime<Utc>>>,
}

/// Marks a field as present, so `null` deserializes to `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ItemPatch {
    /// Orders the edits so date edits see the final perishability.
    pub fn into_edits(self) -> Vec<ItemEdit> {
        let mut edits = Vec::new();
        if let Some(name) = self.name {
            edits.push(ItemEdit::SetName(name));
        }
        if let Some(category) = self.category {
            edits.push(ItemEdit::SetCategory(category_or_default(Some(&category))));
        }
        if let Some(quantity) = self.quantity {
            edits.push(ItemEdit::SetQuantity(quantity));
        }
        if let Some(price) = self.price {
            edits.push(ItemEdit::SetPrice(price));
        }
        if let Some(is_perishable) = self.is_perishable {
            edits.push(ItemEdit::SetPerishable(is_perishable));
        }
        if let Some(purchase_date) = self.purchase_date {
            edits.push(ItemEdit::SetPurchaseDate(purchase_date));
        }
        if let Some(expiry_days) = self.expiry_days {
            edits.push(ItemEdit::SetExpiryDays(expiry_days));
        }
        if let Some(expiry_date) = self.expiry_date {
            edits.push(ItemEdit::SetExpiryDate(expiry_date));
        }
        edits
    }
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ItemsQuery {
    /// all, expiring, expired, perishable, non-perishable, saved, or a category.
    pub filter: Option<String>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Returns the signed-in user's record and pantry counters.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Current user", body = UserResponse))
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UserResponse>, HttpError> {
    let user = state.store.user(&identity).await.map_err(reject)?;
    Ok(Json(user.into()))
}

/// Lists pantry items, optionally filtered.
#[utoipa::path(
    get,
    path = "/items",
    params(ItemsQuery),
    responses((status = 200, description = "Pantry items", body = [ItemResponse]))
)]
pub async fn list_items_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<ItemResponse>>, HttpError> {
    let items = state.store.get_items(&identity).await.map_err(reject)?;
    let filtered = match query.filter.as_deref() {
        Some(key) => lifecycle::apply_filter(&items, key),
        None => items,
    };
    Ok(Json(item_responses(filtered)))
}

/// Adds a single item by hand.
#[utoipa::path(
    post,
    path = "/items",
    request_body = ItemInput,
    responses((status = 201, description = "Item added", body = [ItemResponse]))
)]
pub async fn add_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<ItemInput>,
) -> Result<impl IntoResponse, HttpError> {
    if input.name.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Item name is required".to_string()));
    }
    let purchase_date = input.purchase_date.unwrap_or_else(|| state.store.now());
    let items = state
        .store
        .add_item(&identity, purchase_date, input.to_draft())
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(item_responses(items))))
}

/// Edits an item's fields; expiry fields are kept consistent with each other.
#[utoipa::path(
    put,
    path = "/items/{id}",
    request_body = ItemPatch,
    params(("id" = u64, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item updated", body = [ItemResponse]),
        (status = 404, description = "No such item")
    )
)]
pub async fn edit_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<ItemId>,
    Json(patch): Json<ItemPatch>,
) -> Result<Json<Vec<ItemResponse>>, HttpError> {
    let items = state.store.get_items(&identity).await.map_err(reject)?;
    let item = items
        .into_iter()
        .find(|i| i.id == id)
        .ok_or_else(|| reject(PantryError::NotFound(format!("Item {} not found", id))))?;

    let edited = apply_edits(item, patch.into_edits(), state.store.now());
    let items = state.store.edit_item(&identity, edited).await.map_err(reject)?;
    Ok(Json(item_responses(items)))
}

/// Deletes one item.
#[utoipa::path(
    delete,
    path = "/items/{id}",
    params(("id" = u64, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item deleted", body = [ItemResponse]),
        (status = 404, description = "No such item")
    )
)]
pub async fn delete_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<ItemId>,
) -> Result<Json<Vec<ItemResponse>>, HttpError> {
    let items = state.store.delete_item(&identity, id).await.map_err(reject)?;
    Ok(Json(item_responses(items)))
}

/// Deletes every item. A partial failure answers 207 with the surviving items.
#[utoipa::path(
    delete,
    path = "/items",
    responses(
        (status = 200, description = "Pantry cleared", body = DeleteAllResponse),
        (status = 207, description = "Some deletes failed", body = DeleteAllResponse)
    )
)]
pub async fn delete_all_items_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, HttpError> {
    match state.store.delete_all_items(&identity).await {
        Ok(outcome) => Ok((
            StatusCode::OK,
            Json(DeleteAllResponse {
                success: outcome.success,
                deleted: outcome.deleted,
                message: outcome.message,
                items: Vec::new(),
            }),
        )),
        Err(PantryError::PartialBatchFailure {
            deleted,
            failed,
            total,
        }) => {
            let (status, message) = reject(PantryError::PartialBatchFailure {
                deleted,
                failed,
                total,
            });
            let remaining = state.store.get_items(&identity).await.map_err(reject)?;
            Ok((
                status,
                Json(DeleteAllResponse {
                    success: false,
                    deleted,
                    message,
                    items: item_responses(remaining),
                }),
            ))
        }
        Err(e) => Err(reject(e)),
    }
}

/// Uses one unit of an item. Using the last unit marks it saved from waste.
#[utoipa::path(
    post,
    path = "/items/{id}/use",
    params(("id" = u64, Path, description = "Item id")),
    responses(
        (status = 200, description = "Item used", body = UseItemResponse),
        (status = 409, description = "Item already used up")
    )
)]
pub async fn use_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<ItemId>,
) -> Result<Json<UseItemResponse>, HttpError> {
    let outcome = state.store.use_item(&identity, id).await.map_err(reject)?;
    Ok(Json(UseItemResponse {
        item: outcome.item.into(),
        newly_saved: outcome.newly_saved,
        items: item_responses(outcome.items),
        stats: outcome.stats.into(),
    }))
}

/// Expiring, recent and saved items plus pantry statistics.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses((status = 200, description = "Dashboard view", body = DashboardResponse))
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DashboardResponse>, HttpError> {
    let dashboard = state.store.dashboard(&identity).await.map_err(reject)?;
    Ok(Json(dashboard.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_translates_present_fields_only() {
        let patch: ItemPatch = serde_json::from_str(
            r#"{"name":"Oat milk","category":"beverages","expiryDays":10}"#,
        )
        .unwrap();
        assert_eq!(
            patch.into_edits(),
            vec![
                ItemEdit::SetName("Oat milk".into()),
                ItemEdit::SetCategory(Category::Beverages),
                ItemEdit::SetExpiryDays(10),
            ]
        );
    }

    #[test]
    fn patch_tells_a_cleared_expiry_date_from_an_absent_one() {
        let cleared: ItemPatch = serde_json::from_str(r#"{"expiryDate":null}"#).unwrap();
        assert_eq!(cleared.into_edits(), vec![ItemEdit::SetExpiryDate(None)]);

        let untouched: ItemPatch = serde_json::from_str(r#"{"name":"Kefir"}"#).unwrap();
        assert_eq!(untouched.into_edits(), vec![ItemEdit::SetName("Kefir".into())]);

        let set: ItemPatch =
            serde_json::from_str(r#"{"expiryDate":"2024-03-01T00:00:00Z"}"#).unwrap();
        assert!(matches!(
            set.into_edits().as_slice(),
            [ItemEdit::SetExpiryDate(Some(_))]
        ));
    }

    #[test]
    fn input_defaults() {
        let input: ItemInput = serde_json::from_str(r#"{"name":" Tofu ","category":"tofu"}"#).unwrap();
        let draft = input.to_draft();
        assert_eq!(draft.name, "Tofu");
        assert_eq!(draft.category, Category::Uncategorized);
        assert_eq!(draft.quantity, 1);
        assert!(draft.is_perishable);
    }
}
