pub mod auth;
pub mod intake;
pub mod items;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use rest::ApiDoc;
use state::AppState;

pub use middleware::require_auth;

/// Builds the complete application router, including the Swagger UI.
pub fn router(app_state: Arc<AppState>) -> Result<Router, ApiError> {
    let origin = app_state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| ApiError::Internal(format!("Invalid CORS_ORIGIN: {}", e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/signup", post(auth::signup_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/provider", post(auth::provider_login_handler))
        .route("/auth/logout", post(auth::logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/me", get(items::me_handler))
        .route("/dashboard", get(items::dashboard_handler))
        .route(
            "/items",
            get(items::list_items_handler)
                .post(items::add_item_handler)
                .delete(items::delete_all_items_handler),
        )
        .route(
            "/items/{id}",
            put(items::edit_item_handler).delete(items::delete_item_handler),
        )
        .route("/items/{id}/use", post(items::use_item_handler))
        .route(
            "/intake",
            get(intake::get_staging_handler).delete(intake::discard_staging_handler),
        )
        .route("/intake/receipt", post(intake::upload_receipt_handler))
        .route("/intake/items", post(intake::add_staged_item_handler))
        .route(
            "/intake/items/{temp_id}",
            put(intake::edit_staged_item_handler).delete(intake::remove_staged_item_handler),
        )
        .route("/intake/purchase-date", put(intake::set_purchase_date_handler))
        .route("/intake/commit", post(intake::commit_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    let max_upload_bytes = app_state.config.max_upload_bytes;

    // Combine API routes
    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    Ok(Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())))
}
