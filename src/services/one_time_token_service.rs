//! Lifecycle of single-use bootstrap tokens: issue, validate, consume.
//!
//! Validation and consumption are separate on purpose. Callers validate,
//! run their remaining business checks, and only then consume, so a token
//! is never burned by a request that goes on to fail. Consumption rides in
//! the caller's transaction for the same reason.

use chrono::{Duration, Utc};
use sea_orm::ConnectionTrait;
use thiserror::Error;
use tracing::debug;

use crate::auth::TokenPurpose;
use crate::auth::one_time::generate_token_value;
use crate::config::OneTimeTokenConfig;
use crate::db::repositories::{one_time_token, parse_timestamp};
use crate::entities::one_time_tokens;

#[derive(Debug, Error)]
pub enum OneTimeTokenError {
    #[error("Invalid or expired token")]
    NotFound,

    #[error("Invalid token type")]
    WrongPurpose,

    #[error("Token has already been used or is no longer valid")]
    AlreadyUsed,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for OneTimeTokenError {
    fn from(err: anyhow::Error) -> Self {
        // Keep the cause chain, not just the outermost context.
        Self::Database(format!("{err:#}"))
    }
}

/// Issues and checks one-time tokens. Methods take the connection explicitly
/// so mutations can participate in a caller's transaction.
#[derive(Debug, Clone, Copy)]
pub struct OneTimeTokenManager {
    /// None disables time-based expiry; tokens then stay live until
    /// consumed or superseded by a reissue.
    ttl: Option<Duration>,
}

impl OneTimeTokenManager {
    #[must_use]
    pub const fn new(ttl: Option<Duration>) -> Self {
        Self { ttl }
    }

    #[must_use]
    pub fn from_config(config: &OneTimeTokenConfig) -> Self {
        let ttl = if config.ttl_hours > 0 {
            Some(Duration::hours(config.ttl_hours))
        } else {
            None
        };
        Self { ttl }
    }

    /// Create a fresh token for `(owner, purpose)`. With `invalidate_prior`,
    /// every unconsumed token of the same purpose for the same owner is
    /// marked consumed first, so at most one link is ever live per purpose.
    pub async fn issue<C: ConnectionTrait>(
        &self,
        conn: &C,
        user_id: i32,
        purpose: TokenPurpose,
        invalidate_prior: bool,
    ) -> Result<String, OneTimeTokenError> {
        if invalidate_prior {
            let invalidated = one_time_token::invalidate_unconsumed(conn, user_id, purpose).await?;
            if invalidated > 0 {
                debug!(
                    "Invalidated {} prior {} token(s) for user {}",
                    invalidated, purpose, user_id
                );
            }
        }

        let value = generate_token_value();
        one_time_token::insert(conn, user_id, &value, purpose).await?;

        metrics::counter!("auth_one_time_tokens_issued_total").increment(1);

        Ok(value)
    }

    /// Look up a presented token without mutating it. Fails when the value
    /// is unknown, expired, issued for a different purpose, or already used.
    pub async fn validate<C: ConnectionTrait>(
        &self,
        conn: &C,
        value: &str,
        expected_purpose: TokenPurpose,
    ) -> Result<one_time_tokens::Model, OneTimeTokenError> {
        let token = one_time_token::find_by_value(conn, value)
            .await?
            .ok_or(OneTimeTokenError::NotFound)?;

        if self.is_expired(&token) {
            debug!("One-time token for user {} has expired", token.user_id);
            return Err(OneTimeTokenError::NotFound);
        }

        if TokenPurpose::parse(&token.purpose) != Some(expected_purpose) {
            debug!(
                "One-time token purpose mismatch: stored {}, expected {}",
                token.purpose, expected_purpose
            );
            return Err(OneTimeTokenError::WrongPurpose);
        }

        if token.consumed {
            return Err(OneTimeTokenError::AlreadyUsed);
        }

        Ok(token)
    }

    /// Burn a token. The underlying update only succeeds for a currently
    /// unconsumed row, so of two racing consumers exactly one wins.
    pub async fn consume<C: ConnectionTrait>(
        &self,
        conn: &C,
        value: &str,
    ) -> Result<(), OneTimeTokenError> {
        let consumed = one_time_token::consume(conn, value).await?;
        if consumed {
            Ok(())
        } else {
            Err(OneTimeTokenError::AlreadyUsed)
        }
    }

    fn is_expired(&self, token: &one_time_tokens::Model) -> bool {
        match self.ttl {
            Some(ttl) => match parse_timestamp(&token.created_at) {
                Some(created_at) => Utc::now() > created_at + ttl,
                // An unparseable issue time fails closed.
                None => true,
            },
            None => false,
        }
    }
}
