use anyhow::{Context, Result};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};

use crate::auth::LockoutState;
use crate::entities::users;

use super::{format_timestamp, parse_timestamp};

/// User data returned from the store (without the password hash).
#[derive(Debug, Clone)]
pub struct User {
    pub id: i32,
    pub username: String,
    pub email: String,
    pub enabled: bool,
    pub locked: bool,
    pub failed_attempts: i32,
    pub locked_until: Option<String>,
    pub token_version: i32,
    pub must_change_password: bool,
    pub temporary_password: bool,
    pub roles: Vec<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        let roles = split_roles(&model.roles);
        Self {
            id: model.id,
            username: model.username,
            email: model.email,
            enabled: model.enabled,
            locked: model.locked,
            failed_attempts: model.failed_attempts,
            locked_until: model.locked_until,
            token_version: model.token_version,
            must_change_password: model.must_change_password,
            temporary_password: model.temporary_password,
            roles,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Fields required to create an account row.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub must_change_password: bool,
    pub temporary_password: bool,
}

/// The functions below are generic over the connection so the same query
/// runs against the pool or inside a transaction handle.
pub async fn find_by_username<C: ConnectionTrait>(
    conn: &C,
    username: &str,
) -> Result<Option<users::Model>> {
    users::Entity::find()
        .filter(users::Column::Username.eq(username))
        .one(conn)
        .await
        .context("Failed to query user by username")
}

pub async fn find_by_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
) -> Result<Option<users::Model>> {
    users::Entity::find()
        .filter(users::Column::Email.eq(email))
        .one(conn)
        .await
        .context("Failed to query user by email")
}

pub async fn find_by_id<C: ConnectionTrait>(conn: &C, id: i32) -> Result<Option<users::Model>> {
    users::Entity::find_by_id(id)
        .one(conn)
        .await
        .context("Failed to query user by ID")
}

/// Accounts still carrying a temporary password that must be changed.
pub async fn find_pending_bootstrap<C: ConnectionTrait>(conn: &C) -> Result<Vec<users::Model>> {
    users::Entity::find()
        .filter(users::Column::MustChangePassword.eq(true))
        .filter(users::Column::TemporaryPassword.eq(true))
        .all(conn)
        .await
        .context("Failed to query accounts pending bootstrap")
}

pub async fn insert<C: ConnectionTrait>(conn: &C, new_user: NewUser) -> Result<users::Model> {
    let now = chrono::Utc::now().to_rfc3339();

    let active = users::ActiveModel {
        username: Set(new_user.username),
        email: Set(new_user.email),
        password_hash: Set(new_user.password_hash),
        enabled: Set(true),
        locked: Set(false),
        failed_attempts: Set(0),
        last_failed_at: Set(None),
        locked_until: Set(None),
        token_version: Set(1),
        must_change_password: Set(new_user.must_change_password),
        temporary_password: Set(new_user.temporary_password),
        roles: Set(join_roles(&new_user.roles)),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    active.insert(conn).await.context("Failed to insert user")
}

/// Persist the lockout counters produced by a policy transition.
pub async fn apply_lockout<C: ConnectionTrait>(
    conn: &C,
    model: users::Model,
    state: LockoutState,
) -> Result<users::Model> {
    let now = chrono::Utc::now().to_rfc3339();

    let mut active: users::ActiveModel = model.into();
    active.failed_attempts = Set(state.failed_attempts);
    active.last_failed_at = Set(state.last_failed_at.map(format_timestamp));
    active.locked_until = Set(state.locked_until.map(format_timestamp));
    active.updated_at = Set(now);

    active
        .update(conn)
        .await
        .context("Failed to update lockout state")
}

/// Replace the password hash, clear both temporary-password flags, and bump
/// the token version so every previously issued session turns invalid.
pub async fn set_password<C: ConnectionTrait>(
    conn: &C,
    model: users::Model,
    password_hash: String,
) -> Result<users::Model> {
    let now = chrono::Utc::now().to_rfc3339();
    let version = model.token_version;

    let mut active: users::ActiveModel = model.into();
    active.password_hash = Set(password_hash);
    active.must_change_password = Set(false);
    active.temporary_password = Set(false);
    active.token_version = Set(version + 1);
    active.updated_at = Set(now);

    active
        .update(conn)
        .await
        .context("Failed to update password")
}

pub async fn bump_token_version<C: ConnectionTrait>(
    conn: &C,
    model: users::Model,
) -> Result<users::Model> {
    let now = chrono::Utc::now().to_rfc3339();
    let version = model.token_version;

    let mut active: users::ActiveModel = model.into();
    active.token_version = Set(version + 1);
    active.updated_at = Set(now);

    active
        .update(conn)
        .await
        .context("Failed to bump token version")
}

/// Clear both the administrative lock and any timed lockout.
pub async fn clear_locks<C: ConnectionTrait>(
    conn: &C,
    model: users::Model,
) -> Result<users::Model> {
    let now = chrono::Utc::now().to_rfc3339();

    let mut active: users::ActiveModel = model.into();
    active.locked = Set(false);
    active.locked_until = Set(None);
    active.failed_attempts = Set(0);
    active.last_failed_at = Set(None);
    active.updated_at = Set(now);

    active.update(conn).await.context("Failed to unlock user")
}

/// Lockout counters of a stored row, parsed for the policy functions.
#[must_use]
pub fn lockout_state(model: &users::Model) -> LockoutState {
    LockoutState {
        failed_attempts: model.failed_attempts,
        last_failed_at: model.last_failed_at.as_deref().and_then(parse_timestamp),
        locked_until: model.locked_until.as_deref().and_then(parse_timestamp),
    }
}

#[must_use]
pub fn split_roles(roles: &str) -> Vec<String> {
    roles
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(ToString::to_string)
        .collect()
}

#[must_use]
pub fn join_roles(roles: &[String]) -> String {
    roles.join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_roles() {
        assert_eq!(split_roles("USER"), vec!["USER"]);
        assert_eq!(split_roles("TECHADMIN, SUPERADMIN"), vec![
            "TECHADMIN",
            "SUPERADMIN"
        ]);
        assert!(split_roles("").is_empty());
    }

    #[test]
    fn test_join_roles() {
        let roles = vec!["TECHADMIN".to_string(), "SUPERADMIN".to_string()];
        assert_eq!(join_roles(&roles), "TECHADMIN,SUPERADMIN");
    }

    #[test]
    fn test_lockout_state_parses_timestamps() {
        let model = users::Model {
            id: 1,
            username: "admin".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: String::new(),
            enabled: true,
            locked: false,
            failed_attempts: 3,
            last_failed_at: Some("2026-08-01T12:00:00+00:00".to_string()),
            locked_until: None,
            token_version: 1,
            must_change_password: false,
            temporary_password: false,
            roles: "USER".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
        };

        let state = lockout_state(&model);
        assert_eq!(state.failed_attempts, 3);
        assert!(state.last_failed_at.is_some());
        assert!(state.locked_until.is_none());
    }
}
