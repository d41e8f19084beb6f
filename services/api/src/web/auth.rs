//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for sign-up, sign-in and sign-out. All of them go
//! through the Auth Gateway; these handlers only translate to and from HTTP.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use pantry_core::{AuthSession, ProviderProfile};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::{session_token, SESSION_COOKIE};
use crate::web::rest::{bad_request, reject, HttpError};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SignupRequest {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// A profile asserted by an external sign-in provider.
#[derive(Deserialize, ToSchema)]
pub struct ProviderSignInRequest {
    pub provider: String,
    pub subject: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn session_cookie(session: &AuthSession, max_age_secs: i64) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE, session.token, max_age_secs
    )
}

/// Makes sure the pantry has a user record, then sets the session cookie.
async fn signed_in(
    state: &AppState,
    session: AuthSession,
    status: StatusCode,
) -> Result<impl IntoResponse, HttpError> {
    state.store.user(&session.identity).await.map_err(reject)?;
    let cookie = session_cookie(&session, state.auth.session_ttl().num_seconds());
    let response = AuthResponse {
        user_id: session.identity.user_id,
        email: session.identity.email,
        name: session.identity.name,
    };
    Ok((status, [(header::SET_COOKIE, cookie)], Json(response)))
}

fn validate_credentials(email: &str, password: &str) -> Result<(), HttpError> {
    if !email.contains('@') {
        return Err(bad_request("A valid email address is required"));
    }
    if password.is_empty() {
        return Err(bad_request("Password must not be empty"));
    }
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/signup - Create a new user account
#[utoipa::path(
    post,
    path = "/auth/signup",
    request_body = SignupRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 409, description = "Email already registered"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn signup_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, HttpError> {
    validate_credentials(&req.email, &req.password)?;
    let session = state
        .auth
        .sign_up(req.name.trim(), req.email.trim(), &req.password)
        .await
        .map_err(reject)?;
    signed_in(&state, session, StatusCode::CREATED).await
}

/// POST /auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HttpError> {
    let session = state
        .auth
        .sign_in(req.email.trim(), &req.password)
        .await
        .map_err(|e| match reject(e) {
            (StatusCode::UNAUTHORIZED, _) => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string())
            }
            other => other,
        })?;
    signed_in(&state, session, StatusCode::OK).await
}

/// POST /auth/provider - Sign in with an external provider profile
#[utoipa::path(
    post,
    path = "/auth/provider",
    request_body = ProviderSignInRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid request")
    )
)]
pub async fn provider_login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProviderSignInRequest>,
) -> Result<impl IntoResponse, HttpError> {
    if !req.email.contains('@') || req.subject.is_empty() {
        return Err(bad_request("Provider profile needs an email and a subject"));
    }
    let profile = ProviderProfile {
        provider: req.provider,
        subject: req.subject,
        email: req.email,
        name: req.name,
    };
    let session = state
        .auth
        .sign_in_with_provider(&profile)
        .await
        .map_err(reject)?;
    signed_in(&state, session, StatusCode::OK).await
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HttpError> {
    let token = session_token(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state.auth.sign_out(token).await.map_err(reject)?;

    let cookie = format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}
