use axum::{
    Extension, Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, MessageResponse};
use crate::services::{AuthError, RegisterUser, SessionUser, UserInfo};
use crate::services::{ROLE_SUPERADMIN, ROLE_TECHADMIN};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub role: String,
}

/// The first-login link is delivered by email only; it never appears in the
/// HTTP response.
#[derive(Serialize)]
pub struct CreateUserResponse {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Only administrators may manage accounts.
fn require_admin(session: &SessionUser) -> Result<(), ApiError> {
    let is_admin = session
        .roles
        .iter()
        .any(|role| role == ROLE_TECHADMIN || role == ROLE_SUPERADMIN);

    if is_admin {
        Ok(())
    } else {
        Err(ApiError::forbidden("Administrator role required"))
    }
}

/// POST /users
/// Provision an account with a generated temporary password and send the
/// first-login email.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionUser>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<CreateUserResponse>>, ApiError> {
    require_admin(&session)?;

    let created = state
        .auth()
        .register_user(
            RegisterUser {
                username: payload.username,
                email: payload.email,
                roles: vec![payload.role],
            },
            &session.username,
        )
        .await?;

    Ok(Json(ApiResponse::success(CreateUserResponse {
        id: created.id,
        username: created.username,
        email: created.email,
        roles: created.roles,
    })))
}

/// GET /users/{username}
/// Account details including lockout state, for administrators.
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionUser>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    require_admin(&session)?;

    let info = state
        .auth()
        .user_info(&username)
        .await
        .map_err(|err| match err {
            AuthError::NotFound => ApiError::user_not_found(&username),
            other => other.into(),
        })?;

    Ok(Json(ApiResponse::success(info)))
}

/// POST /users/{username}/unlock
/// Clear the administrative lock and any timed lockout on an account.
pub async fn unlock_user(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionUser>,
    Path(username): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_admin(&session)?;

    state
        .auth()
        .unlock_user(&username, &session.username)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "Account unlocked",
    ))))
}
