//! services/api/src/web/rest.rs
//!
//! The master definition for the OpenAPI specification and the mapping from
//! pantry errors to HTTP responses shared by every handler.

use axum::http::StatusCode;
use pantry_core::PantryError;
use tracing::{error, warn};
use utoipa::OpenApi;

use crate::web::{auth, intake, items};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::signup_handler,
        auth::login_handler,
        auth::provider_login_handler,
        auth::logout_handler,
        items::me_handler,
        items::list_items_handler,
        items::add_item_handler,
        items::edit_item_handler,
        items::delete_item_handler,
        items::delete_all_items_handler,
        items::use_item_handler,
        items::dashboard_handler,
        intake::upload_receipt_handler,
        intake::get_staging_handler,
        intake::discard_staging_handler,
        intake::add_staged_item_handler,
        intake::edit_staged_item_handler,
        intake::remove_staged_item_handler,
        intake::set_purchase_date_handler,
        intake::commit_handler,
    ),
    components(
        schemas(
            auth::SignupRequest,
            auth::LoginRequest,
            auth::ProviderSignInRequest,
            auth::AuthResponse,
            items::ItemResponse,
            items::ItemInput,
            items::ItemPatch,
            items::StatsResponse,
            items::DashboardResponse,
            items::DeleteAllResponse,
            items::UseItemResponse,
            items::UserResponse,
            intake::StagedItemResponse,
            intake::StagingResponse,
            intake::PurchaseDateRequest,
        )
    ),
    tags(
        (name = "Pantry API", description = "Receipt intake and expiry tracking for a personal pantry.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Error Mapping
//=========================================================================================

pub type HttpError = (StatusCode, String);

/// Converts a pantry error into a status and human-readable message.
pub fn reject(e: PantryError) -> HttpError {
    let status = match &e {
        PantryError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        PantryError::NotFound(_) => StatusCode::NOT_FOUND,
        PantryError::InvalidOperation(_) => StatusCode::CONFLICT,
        PantryError::PartialBatchFailure { .. } => StatusCode::MULTI_STATUS,
        PantryError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    if status.is_server_error() {
        error!("Request failed: {}", e);
    } else {
        warn!("Request rejected: {}", e);
    }
    (status, e.to_string())
}

pub fn bad_request(message: impl Into<String>) -> HttpError {
    (StatusCode::BAD_REQUEST, message.into())
}
