//! Domain service for authentication and session integrity.
//!
//! Composes the lockout policy, session token codec, and one-time token
//! manager into the login, logout, password-change, and first-login flows.

use serde::Serialize;
use thiserror::Error;

use crate::services::one_time_token_service::OneTimeTokenError;

pub const ROLE_USER: &str = "USER";
pub const ROLE_TECHADMIN: &str = "TECHADMIN";
pub const ROLE_SUPERADMIN: &str = "SUPERADMIN";

/// Closed error taxonomy for authentication operations. The HTTP layer maps
/// each variant to a status code; the messages here are the user-facing ones.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown identity, wrong password, disabled account, or lockout in
    /// effect. Deliberately indistinguishable to the caller so none of those
    /// factors can be probed.
    #[error("Invalid username or password")]
    BadCredentials,

    /// Missing, malformed, expired, tampered, or version-stale session
    /// token. Uniformly "unauthenticated"; never distinguished from
    /// "no token provided".
    #[error("Invalid or expired session")]
    TokenInvalid,

    /// One-time token not found, expired, wrong purpose, or already used.
    /// Collapsed to a single message to avoid leaking which it was.
    #[error("Token is invalid, expired, or has already been used")]
    OneTimeTokenInvalid,

    /// Self-inflicted request problems (confirmation mismatch, weak new
    /// password, flow used on an account not in the expected state). These
    /// carry precise messages since precision is harmless here.
    #[error("{0}")]
    PolicyViolation(String),

    /// Identity absent on a path where it was already trusted, e.g. the
    /// account was deleted between token verification and the operation.
    #[error("User not found")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        // Alternate formatting keeps the cause chain; the context string
        // alone says nothing about what the database actually reported.
        Self::Internal(format!("{err:#}"))
    }
}

impl From<OneTimeTokenError> for AuthError {
    fn from(err: OneTimeTokenError) -> Self {
        match err {
            OneTimeTokenError::NotFound
            | OneTimeTokenError::WrongPurpose
            | OneTimeTokenError::AlreadyUsed => Self::OneTimeTokenInvalid,
            OneTimeTokenError::Database(e) => Self::Database(e),
        }
    }
}

/// Verified identity resolved from a session token.
#[derive(Debug, Clone, Serialize)]
pub struct SessionUser {
    pub username: String,
    pub roles: Vec<String>,
}

/// Successful login: the bearer token plus what the UI needs to route the
/// user (a temporary-password account still logs in, but should be steered
/// to the password-change screen).
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub token: String,
    pub username: String,
    pub roles: Vec<String>,
    pub must_change_password: bool,
}

/// User info DTO for responses.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub username: String,
    pub email: String,
    pub enabled: bool,
    pub locked: bool,
    pub failed_attempts: i32,
    pub locked_until: Option<String>,
    pub roles: Vec<String>,
    pub must_change_password: bool,
    pub temporary_password: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Outcome of validating a first-login token, shown on the set-password page.
#[derive(Debug, Clone, Serialize)]
pub struct FirstLoginValidation {
    pub username: String,
    pub email: String,
}

/// Fields for provisioning a new account.
#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
}

/// A freshly provisioned account. The first-login link is for the mailer and
/// the CLI; HTTP responses must not include it.
#[derive(Debug, Clone)]
pub struct CreatedUser {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
    pub first_login_link: String,
}

/// Domain service trait for authentication.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies credentials and mints a session token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::BadCredentials`] for every failure cause: wrong
    /// password, unknown user, disabled account, or active lockout.
    async fn login(&self, username: &str, password: &str) -> Result<LoginResult, AuthError>;

    /// Resolves an Authorization header value to a verified identity.
    /// Checks prefix, signature, expiry, and that the embedded token version
    /// still matches the account's current one.
    async fn authenticate(&self, header_value: &str) -> Result<SessionUser, AuthError>;

    /// Invalidates every session ever issued for this identity by bumping
    /// the account's token version, including the one used to call this.
    async fn logout(&self, username: &str) -> Result<(), AuthError>;

    /// Changes the password of an authenticated user. Clears the
    /// temporary-password flags and invalidates all existing sessions.
    async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError>;

    /// Deprecated variant of the first-login flow entered with username and
    /// temporary password instead of a token. Same postconditions as
    /// [`AuthService::set_password_with_first_login_token`] but does not
    /// mint a session; the user logs in again with the new password.
    async fn change_temporary_password(
        &self,
        username: &str,
        temporary_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError>;

    /// Read-only check of a first-login token, for the set-password page.
    /// Also fails once the owner no longer awaits a first login, so a link
    /// outlived by an out-of-band password change stops resolving.
    async fn validate_first_login_token(
        &self,
        token: &str,
    ) -> Result<FirstLoginValidation, AuthError>;

    /// Sets the password via a first-login token: replaces the hash, clears
    /// the temporary-password flags, bumps the token version, consumes the
    /// token, and mints a session (auto-login) in one atomic unit.
    async fn set_password_with_first_login_token(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<LoginResult, AuthError>;

    /// Provisions an account with a generated temporary password, issues a
    /// first-login token, and emails the link. `actor` is the administrator
    /// performing the operation, recorded in the audit log.
    async fn register_user(
        &self,
        request: RegisterUser,
        actor: &str,
    ) -> Result<CreatedUser, AuthError>;

    /// Clears the administrative lock and any timed lockout.
    async fn unlock_user(&self, username: &str, actor: &str) -> Result<(), AuthError>;

    /// Gets information for a specific user.
    async fn user_info(&self, username: &str) -> Result<UserInfo, AuthError>;
}
