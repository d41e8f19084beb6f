//! services/api/src/web/intake.rs
//!
//! Receipt intake endpoints. A scanned receipt lands in the caller's staging
//! list, where it can be edited freely; nothing reaches the pantry until
//! `POST /intake/commit`.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use pantry_core::intake::{self, StagedItem, StagingAction, StagingList};
use pantry_core::{lifecycle, Category, Identity, ItemDraft, ShelfLife};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::items::{item_responses, ItemInput, ItemResponse};
use crate::web::rest::{bad_request, reject, HttpError};
use crate::web::state::AppState;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StagedItemResponse {
    pub temp_id: Uuid,
    pub name: String,
    pub category: String,
    pub quantity: u32,
    pub price: String,
    pub is_perishable: bool,
    pub expiry_days: Option<i64>,
    pub purchase_date: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub days_left: Option<i64>,
}

impl From<&StagedItem> for StagedItemResponse {
    fn from(s: &StagedItem) -> Self {
        Self {
            temp_id: s.temp_id,
            name: s.draft.name.clone(),
            category: s.draft.category.to_string(),
            quantity: s.draft.quantity,
            price: s.draft.price.clone(),
            is_perishable: s.draft.is_perishable,
            expiry_days: s.draft.expiry_days,
            purchase_date: s.purchase_date,
            expiry_date: s.expiry_date,
            days_left: s.days_left,
        }
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StagingResponse {
    pub store: Option<String>,
    pub purchase_date: DateTime<Utc>,
    pub items: Vec<StagedItemResponse>,
}

impl From<&StagingList> for StagingResponse {
    fn from(list: &StagingList) -> Self {
        Self {
            store: list.store.clone(),
            purchase_date: list.purchase_date,
            items: list.items.iter().map(StagedItemResponse::from).collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseDateRequest {
    pub purchase_date: DateTime<Utc>,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Applies one action to the caller's staging list, creating it if needed.
async fn reduce(
    state: &AppState,
    identity: &Identity,
    action: StagingAction,
) -> Result<Json<StagingResponse>, HttpError> {
    let list = state
        .staging
        .reduce(identity.user_id, action, state.store.now())
        .await
        .map_err(reject)?;
    Ok(Json(StagingResponse::from(&list)))
}

/// Turns a receipt line into a draft using the shelf-life estimate.
async fn draft_for_line(state: &AppState, name: &str, price: &str) -> ItemDraft {
    let estimate = state.shelf_life.estimate(name).await.unwrap_or_else(|e| {
        warn!(name, "Shelf-life lookup failed: {}", e);
        ShelfLife {
            category: Category::Uncategorized,
            is_perishable: true,
            expiry_days: None,
        }
    });
    ItemDraft {
        name: name.to_string(),
        category: estimate.category,
        quantity: 1,
        price: price.to_string(),
        is_perishable: estimate.is_perishable,
        expiry_days: estimate.expiry_days,
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Scan a receipt image and stage its items.
///
/// Accepts a multipart/form-data request; the first part is the image.
/// The receipt image is not stored.
#[utoipa::path(
    post,
    path = "/intake/receipt",
    request_body(content_type = "multipart/form-data", description = "The receipt image."),
    responses(
        (status = 200, description = "Receipt staged", body = StagingResponse),
        (status = 400, description = "Missing or empty image"),
        (status = 503, description = "OCR unavailable")
    )
)]
pub async fn upload_receipt_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    mut multipart: Multipart,
) -> Result<Json<StagingResponse>, HttpError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Failed to read multipart data: {}", e)))?
        .ok_or_else(|| bad_request("Multipart form must include a receipt image"))?;
    let image = field
        .bytes()
        .await
        .map_err(|e| bad_request(format!("Failed to read image bytes: {}", e)))?;
    if image.is_empty() {
        return Err(bad_request("Receipt image is empty"));
    }

    let receipt = state
        .scanner
        .process_receipt(&image)
        .await
        .map_err(|e| reject(e.into()))?;
    info!(user_id = %identity.user_id, store = %receipt.store, lines = receipt.items.len(), "Scanned receipt");

    let now = state.store.now();
    let purchase_date = receipt
        .date
        .as_deref()
        .and_then(|d| lifecycle::parse_date(&Value::from(d)).ok())
        .unwrap_or(now);

    let mut drafts = Vec::with_capacity(receipt.items.len());
    for line in &receipt.items {
        drafts.push(draft_for_line(&state, &line.name, &line.price).await);
    }

    reduce(
        &state,
        &identity,
        StagingAction::Stage {
            items: drafts,
            purchase_date,
            store: Some(receipt.store),
        },
    )
    .await
}

/// The caller's current staging list (empty if nothing is staged).
#[utoipa::path(
    get,
    path = "/intake",
    responses((status = 200, description = "Staged items", body = StagingResponse))
)]
pub async fn get_staging_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Json<StagingResponse> {
    let now = state.store.now();
    let list = state
        .staging
        .get(identity.user_id, now)
        .await
        .unwrap_or_else(|| StagingList::new(now));
    Json(StagingResponse::from(&list))
}

/// Throws away everything staged.
#[utoipa::path(
    delete,
    path = "/intake",
    responses((status = 204, description = "Staging list discarded"))
)]
pub async fn discard_staging_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> StatusCode {
    state.staging.remove(identity.user_id).await;
    StatusCode::NO_CONTENT
}

/// Stages an item by hand.
#[utoipa::path(
    post,
    path = "/intake/items",
    request_body = ItemInput,
    responses((status = 200, description = "Item staged", body = StagingResponse))
)]
pub async fn add_staged_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(input): Json<ItemInput>,
) -> Result<Json<StagingResponse>, HttpError> {
    if input.name.trim().is_empty() {
        return Err(bad_request("Item name is required"));
    }
    reduce(&state, &identity, StagingAction::Add(input.to_draft())).await
}

/// Replaces a staged item.
#[utoipa::path(
    put,
    path = "/intake/items/{temp_id}",
    request_body = ItemInput,
    params(("temp_id" = Uuid, Path, description = "Temporary staging id")),
    responses(
        (status = 200, description = "Staged item updated", body = StagingResponse),
        (status = 404, description = "No such staged item")
    )
)]
pub async fn edit_staged_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(temp_id): Path<Uuid>,
    Json(input): Json<ItemInput>,
) -> Result<Json<StagingResponse>, HttpError> {
    reduce(
        &state,
        &identity,
        StagingAction::Edit {
            temp_id,
            draft: input.to_draft(),
        },
    )
    .await
}

/// Removes a staged item.
#[utoipa::path(
    delete,
    path = "/intake/items/{temp_id}",
    params(("temp_id" = Uuid, Path, description = "Temporary staging id")),
    responses(
        (status = 200, description = "Staged item removed", body = StagingResponse),
        (status = 404, description = "No such staged item")
    )
)]
pub async fn remove_staged_item_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(temp_id): Path<Uuid>,
) -> Result<Json<StagingResponse>, HttpError> {
    reduce(&state, &identity, StagingAction::Remove(temp_id)).await
}

/// Moves every staged item to a new purchase date.
#[utoipa::path(
    put,
    path = "/intake/purchase-date",
    request_body = PurchaseDateRequest,
    responses((status = 200, description = "Purchase date updated", body = StagingResponse))
)]
pub async fn set_purchase_date_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<PurchaseDateRequest>,
) -> Result<Json<StagingResponse>, HttpError> {
    reduce(&state, &identity, StagingAction::SetPurchaseDate(req.purchase_date)).await
}

/// Saves the staged items to the pantry and clears the staging list.
#[utoipa::path(
    post,
    path = "/intake/commit",
    responses(
        (status = 201, description = "Items saved to the pantry", body = [ItemResponse]),
        (status = 409, description = "Nothing staged")
    )
)]
pub async fn commit_handler(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, HttpError> {
    // Work on a copy so the staging lock is not held across the store call.
    let now = state.store.now();
    let mut list = state
        .staging
        .get(identity.user_id, now)
        .await
        .unwrap_or_else(|| StagingList::new(now));

    let items = intake::commit(&state.store, &identity, &mut list)
        .await
        .map_err(reject)?;
    state.staging.remove(identity.user_id).await;

    Ok((StatusCode::CREATED, Json(item_responses(items))))
}
