use axum::{
    Extension, Json,
    extract::{Query, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::services::{LoginResult, SessionUser};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub roles: Vec<String>,
    pub must_change_password: bool,
}

impl From<LoginResult> for LoginResponse {
    fn from(result: LoginResult) -> Self {
        Self {
            token: result.token,
            username: result.username,
            roles: result.roles,
            must_change_password: result.must_change_password,
        }
    }
}

#[derive(Serialize)]
pub struct MeResponse {
    pub username: String,
    pub roles: Vec<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct ChangeTemporaryPasswordRequest {
    pub username: String,
    pub temporary_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct ValidateTokenQuery {
    pub token: String,
}

#[derive(Serialize)]
pub struct ValidateTokenResponse {
    pub username: String,
    pub email: String,
}

#[derive(Deserialize)]
pub struct SetPasswordRequest {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware for protected routes.
///
/// Resolves the `Authorization: Bearer <token>` header to a verified
/// [`SessionUser`] and inserts it as a request extension. A missing header
/// and a malformed or stale token fail identically with 401.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    let session = state.auth().authenticate(header_value).await?;

    tracing::Span::current().record("user_id", session.username.as_str());
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Verify credentials and mint a session token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let result = state
        .auth()
        .login(&payload.username, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(result.into())))
}

/// POST /auth/logout
/// Invalidate every session for the authenticated user, including the one
/// used to make this call.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionUser>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.auth().logout(&session.username).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Logout successful. All sessions have been invalidated.",
    ))))
}

/// GET /auth/me
/// Return the identity resolved from the session token.
pub async fn me(
    Extension(session): Extension<SessionUser>,
) -> Json<ApiResponse<MeResponse>> {
    Json(ApiResponse::success(MeResponse {
        username: session.username,
        roles: session.roles,
    }))
}

/// POST /auth/change-password
/// Change the password of the authenticated user. Invalidates all sessions.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionUser>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth()
        .change_password(
            &session.username,
            &payload.current_password,
            &payload.new_password,
            &payload.confirm_password,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password changed successfully",
    ))))
}

/// POST /auth/change-temporary-password
/// Replace a temporary password using the credentials themselves instead of
/// a first-login token. Does not log the user in.
pub async fn change_temporary_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChangeTemporaryPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }

    state
        .auth()
        .change_temporary_password(
            &payload.username,
            &payload.temporary_password,
            &payload.new_password,
            &payload.confirm_password,
        )
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Password changed successfully. Please login again with your new password.",
    ))))
}

/// GET /auth/first-login/validate?token=...
/// Read-only probe of a first-login token, used to render the set-password
/// page. Does not consume the token.
pub async fn validate_first_login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ValidateTokenQuery>,
) -> Result<Json<ApiResponse<ValidateTokenResponse>>, ApiError> {
    let validation = state.auth().validate_first_login_token(&query.token).await?;

    Ok(Json(ApiResponse::success(ValidateTokenResponse {
        username: validation.username,
        email: validation.email,
    })))
}

/// POST /auth/first-login/set-password
/// Set the initial password via a first-login token and log the user in.
pub async fn set_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let result = state
        .auth()
        .set_password_with_first_login_token(
            &payload.token,
            &payload.new_password,
            &payload.confirm_password,
        )
        .await?;

    Ok(Json(ApiResponse::success(result.into())))
}
