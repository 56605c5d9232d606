//! `SeaORM` implementation of the `AuthService` trait.
//!
//! Every read-modify-write runs inside a transaction so concurrent attempts
//! against the same account cannot lose updates, and so a one-time token is
//! never consumed when a later step of its flow fails.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::TransactionTrait;
use tracing::{info, warn};

use crate::auth::{LockoutPolicy, SessionCodec, TokenPurpose, password, session};
use crate::config::{Config, SecurityConfig};
use crate::db::repositories::one_time_token as token_repo;
use crate::db::repositories::user as user_repo;
use crate::db::{NewUser, Store, User};
use crate::services::auth_service::{
    AuthError, AuthService, CreatedUser, FirstLoginValidation, LoginResult, RegisterUser,
    ROLE_SUPERADMIN, ROLE_TECHADMIN, ROLE_USER, SessionUser, UserInfo,
};
use crate::services::mailer::Mailer;
use crate::services::one_time_token_service::OneTimeTokenManager;

pub struct SeaOrmAuthService {
    store: Store,
    codec: SessionCodec,
    lockout: LockoutPolicy,
    tokens: OneTimeTokenManager,
    mailer: Arc<dyn Mailer>,
    security: SecurityConfig,
    frontend_base_url: String,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(store: Store, config: &Config, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            store,
            codec: SessionCodec::from_config(&config.session),
            lockout: LockoutPolicy::from_config(&config.security.lockout),
            tokens: OneTimeTokenManager::from_config(&config.tokens),
            mailer,
            security: config.security.clone(),
            frontend_base_url: config.email.frontend_base_url.clone(),
        }
    }

    fn first_login_link(&self, token_value: &str) -> String {
        format!(
            "{}/first-login?token={}",
            self.frontend_base_url.trim_end_matches('/'),
            token_value
        )
    }

    /// Issue first-login links for accounts that still carry a temporary
    /// password but never had a token issued, then email them. Covers the
    /// migration-seeded administrator on first startup and is a no-op after.
    pub async fn ensure_bootstrap_links(&self) -> anyhow::Result<()> {
        let pending = user_repo::find_pending_bootstrap(&self.store.conn).await?;

        for user in pending {
            let issued =
                token_repo::count_for_user(&self.store.conn, user.id, TokenPurpose::FirstLogin)
                    .await?;
            if issued > 0 {
                continue;
            }

            let txn = self.store.conn.begin().await?;
            let value = self
                .tokens
                .issue(&txn, user.id, TokenPurpose::FirstLogin, true)
                .await?;
            txn.commit().await?;

            let link = self.first_login_link(&value);
            if let Err(e) = self
                .mailer
                .send_first_login_email(&user.username, &user.email, &link)
                .await
            {
                warn!("Failed to send first-login email to {}: {}", user.email, e);
            }

            info!("Issued first-login link for account: {}", user.username);
        }

        Ok(())
    }

    /// One attempt of the first-login set-password transaction, split out so
    /// a write conflict can be re-run against the winner's committed state.
    async fn set_password_with_token_once(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<LoginResult, AuthError> {
        let txn = self.store.conn.begin().await?;

        let record = self
            .tokens
            .validate(&txn, token, TokenPurpose::FirstLogin)
            .await?;

        let user = user_repo::find_by_id(&txn, record.user_id)
            .await?
            .ok_or(AuthError::OneTimeTokenInvalid)?;

        // Replay guard: an out-of-band password change already cleared the
        // flags, so this link must no longer set one.
        if !(user.must_change_password && user.temporary_password) {
            return Err(AuthError::PolicyViolation(
                "Password has already been set for this account".to_string(),
            ));
        }

        if password::verify_password(new_password, &user.password_hash).await? {
            return Err(AuthError::PolicyViolation(
                "New password must be different from the temporary password".to_string(),
            ));
        }

        let new_hash = password::hash_password_async(new_password, Some(&self.security)).await?;
        let updated = user_repo::set_password(&txn, user, new_hash).await?;

        // Consume last, inside the transaction: if another request burned
        // the token first, this errors and the password write rolls back.
        self.tokens.consume(&txn, token).await?;

        txn.commit().await?;

        let roles = user_repo::split_roles(&updated.roles);
        let session_token = self
            .codec
            .mint(&updated.username, &roles, updated.token_version)?;

        metrics::counter!("auth_first_logins_total").increment(1);
        info!(
            "First-login password set, session issued: {}",
            updated.username
        );

        Ok(LoginResult {
            token: session_token,
            username: updated.username,
            roles,
            must_change_password: updated.must_change_password,
        })
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn login(&self, username: &str, password_plain: &str) -> Result<LoginResult, AuthError> {
        let txn = self.store.conn.begin().await?;

        // Unknown identity reads exactly like a wrong password.
        let Some(user) = user_repo::find_by_username(&txn, username).await? else {
            metrics::counter!("auth_login_failures_total").increment(1);
            return Err(AuthError::BadCredentials);
        };

        if !user.enabled {
            metrics::counter!("auth_login_failures_total").increment(1);
            warn!("Login attempt on disabled account: {}", username);
            return Err(AuthError::BadCredentials);
        }

        let now = Utc::now();
        let state = user_repo::lockout_state(&user);
        if !self.lockout.is_authenticatable(&state, user.locked, now) {
            metrics::counter!("auth_login_failures_total").increment(1);
            warn!("Login attempt on locked account: {}", username);
            return Err(AuthError::BadCredentials);
        }

        let valid = password::verify_password(password_plain, &user.password_hash).await?;
        if !valid {
            let next = self.lockout.record_failure(state, now);
            let newly_locked = next.locked_until.is_some() && next.locked_until != state.locked_until;
            user_repo::apply_lockout(&txn, user, next).await?;
            txn.commit().await?;

            metrics::counter!("auth_login_failures_total").increment(1);
            if newly_locked {
                metrics::counter!("auth_lockouts_total").increment(1);
                warn!("Account locked after repeated failures: {}", username);
            }
            return Err(AuthError::BadCredentials);
        }

        let roles = user_repo::split_roles(&user.roles);
        let token_version = user.token_version;
        let must_change_password = user.must_change_password;

        if let Some(reset) = self.lockout.record_success(state) {
            user_repo::apply_lockout(&txn, user, reset).await?;
        }
        txn.commit().await?;

        let token = self.codec.mint(username, &roles, token_version)?;

        metrics::counter!("auth_login_success_total").increment(1);
        info!("User logged in: {}", username);

        Ok(LoginResult {
            token,
            username: username.to_string(),
            roles,
            must_change_password,
        })
    }

    async fn authenticate(&self, header_value: &str) -> Result<SessionUser, AuthError> {
        let token = session::bearer_token(header_value).ok_or(AuthError::TokenInvalid)?;
        let claims = self.codec.decode(token).ok_or(AuthError::TokenInvalid)?;

        let user = user_repo::find_by_username(&self.store.conn, &claims.sub)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if !user.enabled || user.locked {
            return Err(AuthError::TokenInvalid);
        }

        // The sole global-logout mechanism: a stale embedded version means
        // the account logged out or changed password after this was minted.
        if claims.token_version != user.token_version {
            return Err(AuthError::TokenInvalid);
        }

        Ok(SessionUser {
            roles: user_repo::split_roles(&user.roles),
            username: user.username,
        })
    }

    async fn logout(&self, username: &str) -> Result<(), AuthError> {
        let txn = self.store.conn.begin().await?;

        let user = user_repo::find_by_username(&txn, username)
            .await?
            .ok_or(AuthError::NotFound)?;
        user_repo::bump_token_version(&txn, user).await?;

        txn.commit().await?;

        info!("User logged out, all sessions invalidated: {}", username);
        Ok(())
    }

    async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::PolicyViolation(
                "New password and confirmation do not match".to_string(),
            ));
        }
        if let Err(msg) = password::validate_new_password(new_password) {
            return Err(AuthError::PolicyViolation(msg));
        }
        if current_password == new_password {
            return Err(AuthError::PolicyViolation(
                "New password must be different from the current password".to_string(),
            ));
        }

        let txn = self.store.conn.begin().await?;

        let user = user_repo::find_by_username(&txn, username)
            .await?
            .ok_or(AuthError::NotFound)?;

        let valid = password::verify_password(current_password, &user.password_hash).await?;
        if !valid {
            warn!("Password change with wrong current password: {}", username);
            return Err(AuthError::BadCredentials);
        }

        let new_hash = password::hash_password_async(new_password, Some(&self.security)).await?;
        user_repo::set_password(&txn, user, new_hash).await?;

        txn.commit().await?;

        info!("Password changed: {}", username);
        Ok(())
    }

    async fn change_temporary_password(
        &self,
        username: &str,
        temporary_password: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<(), AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::PolicyViolation(
                "New password and confirmation do not match".to_string(),
            ));
        }
        if let Err(msg) = password::validate_new_password(new_password) {
            return Err(AuthError::PolicyViolation(msg));
        }
        if temporary_password == new_password {
            return Err(AuthError::PolicyViolation(
                "New password must be different from the temporary password".to_string(),
            ));
        }

        let txn = self.store.conn.begin().await?;

        // Re-authenticates with the temporary credential, so the same
        // lockout bookkeeping as login applies.
        let Some(user) = user_repo::find_by_username(&txn, username).await? else {
            return Err(AuthError::BadCredentials);
        };

        if !user.enabled {
            return Err(AuthError::BadCredentials);
        }

        let now = Utc::now();
        let state = user_repo::lockout_state(&user);
        if !self.lockout.is_authenticatable(&state, user.locked, now) {
            return Err(AuthError::BadCredentials);
        }

        let valid = password::verify_password(temporary_password, &user.password_hash).await?;
        if !valid {
            let next = self.lockout.record_failure(state, now);
            user_repo::apply_lockout(&txn, user, next).await?;
            txn.commit().await?;
            metrics::counter!("auth_login_failures_total").increment(1);
            return Err(AuthError::BadCredentials);
        }

        let user = if let Some(reset) = self.lockout.record_success(state) {
            user_repo::apply_lockout(&txn, user, reset).await?
        } else {
            user
        };

        if !(user.must_change_password && user.temporary_password) {
            txn.commit().await?;
            return Err(AuthError::PolicyViolation(
                "Account does not require a temporary password change".to_string(),
            ));
        }

        let new_hash = password::hash_password_async(new_password, Some(&self.security)).await?;
        user_repo::set_password(&txn, user, new_hash).await?;

        txn.commit().await?;

        info!("Temporary password changed: {}", username);
        Ok(())
    }

    async fn validate_first_login_token(
        &self,
        token: &str,
    ) -> Result<FirstLoginValidation, AuthError> {
        let conn = &self.store.conn;

        let record = self
            .tokens
            .validate(conn, token, TokenPurpose::FirstLogin)
            .await?;

        let user = user_repo::find_by_id(conn, record.user_id)
            .await?
            .ok_or(AuthError::OneTimeTokenInvalid)?;

        // A link outlives its purpose once the password was set some other
        // way; report it exactly like a spent token.
        if !(user.must_change_password && user.temporary_password) {
            return Err(AuthError::OneTimeTokenInvalid);
        }

        Ok(FirstLoginValidation {
            username: user.username,
            email: user.email,
        })
    }

    async fn set_password_with_first_login_token(
        &self,
        token: &str,
        new_password: &str,
        confirm_password: &str,
    ) -> Result<LoginResult, AuthError> {
        if new_password != confirm_password {
            return Err(AuthError::PolicyViolation(
                "New password and confirmation do not match".to_string(),
            ));
        }
        if let Err(msg) = password::validate_new_password(new_password) {
            return Err(AuthError::PolicyViolation(msg));
        }

        match self.set_password_with_token_once(token, new_password).await {
            // SQLite aborts the loser when two requests race on this token.
            // One re-run sees the winner's commit, finds the token consumed,
            // and reports it like any other spent token.
            Err(err) if is_write_conflict(&err) => {
                self.set_password_with_token_once(token, new_password).await
            }
            result => result,
        }
    }

    async fn register_user(
        &self,
        request: RegisterUser,
        actor: &str,
    ) -> Result<CreatedUser, AuthError> {
        if request.username.trim().is_empty() {
            return Err(AuthError::PolicyViolation(
                "Username must not be empty".to_string(),
            ));
        }
        if request.email.trim().is_empty() || !request.email.contains('@') {
            return Err(AuthError::PolicyViolation(
                "A valid email address is required".to_string(),
            ));
        }
        if request.roles.is_empty() {
            return Err(AuthError::PolicyViolation(
                "At least one role is required".to_string(),
            ));
        }
        for role in &request.roles {
            if ![ROLE_USER, ROLE_TECHADMIN, ROLE_SUPERADMIN].contains(&role.as_str()) {
                return Err(AuthError::PolicyViolation(format!("Unknown role: {role}")));
            }
        }

        // The account starts with a generated temporary password that is
        // never revealed; the emailed first-login link is the only way in.
        let temporary_password = password::generate_temporary_password();
        let password_hash =
            password::hash_password_async(&temporary_password, Some(&self.security)).await?;

        let txn = self.store.conn.begin().await?;

        if user_repo::find_by_username(&txn, &request.username)
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict("Username already exists".to_string()));
        }
        if user_repo::find_by_email(&txn, &request.email)
            .await?
            .is_some()
        {
            return Err(AuthError::Conflict("Email already exists".to_string()));
        }

        let user = user_repo::insert(&txn, NewUser {
            username: request.username,
            email: request.email,
            password_hash,
            roles: request.roles,
            must_change_password: true,
            temporary_password: true,
        })
        .await?;

        let token_value = self
            .tokens
            .issue(&txn, user.id, TokenPurpose::FirstLogin, true)
            .await?;

        txn.commit().await?;

        let link = self.first_login_link(&token_value);
        if let Err(e) = self
            .mailer
            .send_first_login_email(&user.username, &user.email, &link)
            .await
        {
            warn!("Failed to send first-login email to {}: {}", user.email, e);
        }

        metrics::counter!("auth_users_created_total").increment(1);
        info!("User created by {}: {} ({})", actor, user.username, user.email);

        Ok(CreatedUser {
            id: user.id,
            roles: user_repo::split_roles(&user.roles),
            username: user.username,
            email: user.email,
            first_login_link: link,
        })
    }

    async fn unlock_user(&self, username: &str, actor: &str) -> Result<(), AuthError> {
        let txn = self.store.conn.begin().await?;

        let user = user_repo::find_by_username(&txn, username)
            .await?
            .ok_or(AuthError::NotFound)?;
        user_repo::clear_locks(&txn, user).await?;

        txn.commit().await?;

        info!("User {} unlocked by {}", username, actor);
        Ok(())
    }

    async fn user_info(&self, username: &str) -> Result<UserInfo, AuthError> {
        let model = user_repo::find_by_username(&self.store.conn, username)
            .await?
            .ok_or(AuthError::NotFound)?;
        let user = User::from(model);

        Ok(UserInfo {
            username: user.username,
            email: user.email,
            enabled: user.enabled,
            locked: user.locked,
            failed_attempts: user.failed_attempts,
            locked_until: user.locked_until,
            roles: user.roles,
            must_change_password: user.must_change_password,
            temporary_password: user.temporary_password,
            created_at: user.created_at,
            updated_at: user.updated_at,
        })
    }
}

/// Errors SQLite raises when it aborts the loser of two concurrent write
/// transactions. The failed attempt committed nothing, so re-running is safe.
fn is_write_conflict(err: &AuthError) -> bool {
    match err {
        AuthError::Database(msg) | AuthError::Internal(msg) => {
            let msg = msg.to_ascii_lowercase();
            msg.contains("database is locked")
                || msg.contains("database table is locked")
                || msg.contains("busy")
        }
        _ => false,
    }
}
