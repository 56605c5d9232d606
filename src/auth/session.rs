use anyhow::Result;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SessionConfig;

/// Required scheme prefix for the Authorization header. Matched
/// case-sensitively; anything else is treated as no token at all.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Claims carried by a session token. The embedded `token_version` is
/// compared against the account's current version on every authenticated
/// request; bumping the version on the account is the only revocation
/// mechanism, so no server-side session table exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    /// Username the token was minted for.
    pub sub: String,

    pub roles: Vec<String>,

    pub token_version: i32,

    /// Issued-at, unix seconds.
    pub iat: i64,

    /// Expiration, unix seconds.
    pub exp: i64,

    /// Unique id per minted token, for audit logging.
    pub jti: String,
}

/// Mints and verifies HS256-signed session tokens.
#[derive(Clone)]
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionCodec {
    #[must_use]
    pub fn new(secret: &str, token_ttl_minutes: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::minutes(token_ttl_minutes),
        }
    }

    #[must_use]
    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(&config.secret, config.token_ttl_minutes)
    }

    /// Sign a token for the given account state. Never embeds the password
    /// hash or any other secret material.
    pub fn mint(&self, username: &str, roles: &[String], token_version: i32) -> Result<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            sub: username.to_string(),
            roles: roles.to_vec(),
            token_version,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to sign session token: {e}"))
    }

    /// Decode and verify a presented token. Fails closed: malformed input,
    /// a bad signature, and an elapsed expiry all yield `None`. The version
    /// comparison against the live account happens in the service layer,
    /// which has store access.
    #[must_use]
    pub fn decode(&self, token: &str) -> Option<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }
}

/// Extract the raw token from an Authorization header value. The `Bearer `
/// prefix must match exactly, including case.
#[must_use]
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value.strip_prefix(BEARER_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SessionCodec {
        SessionCodec::new("unit-test-secret-0123456789abcdef", 60)
    }

    #[test]
    fn test_mint_then_decode_round_trip() {
        let codec = codec();
        let roles = vec!["TECHADMIN".to_string()];
        let token = codec.mint("admin", &roles, 3).unwrap();

        let claims = codec.decode(&token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.token_version, 3);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_each_mint_gets_unique_jti() {
        let codec = codec();
        let a = codec.mint("admin", &[], 1).unwrap();
        let b = codec.mint("admin", &[], 1).unwrap();

        let ja = codec.decode(&a).unwrap().jti;
        let jb = codec.decode(&b).unwrap().jti;
        assert_ne!(ja, jb);
    }

    #[test]
    fn test_tampered_token_rejected() {
        let codec = codec();
        let token = codec.mint("admin", &[], 1).unwrap();

        let tampered = format!("{token}x");
        assert!(codec.decode(&tampered).is_none());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let codec = codec();
        let other = SessionCodec::new("a-completely-different-secret!!!", 60);

        let token = codec.mint("admin", &[], 1).unwrap();
        assert!(other.decode(&token).is_none());
    }

    #[test]
    fn test_expired_token_rejected() {
        // Negative TTL mints a token that expired in the past.
        let codec = SessionCodec::new("unit-test-secret-0123456789abcdef", -5);
        let token = codec.mint("admin", &[], 1).unwrap();

        assert!(codec.decode(&token).is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        let codec = codec();
        assert!(codec.decode("").is_none());
        assert!(codec.decode("not.a.jwt").is_none());
        assert!(codec.decode("a.b").is_none());
    }

    #[test]
    fn test_bearer_prefix_is_case_sensitive() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer abc"), None);
        assert_eq!(bearer_token("BEARER abc"), None);
        assert_eq!(bearer_token("Token abc"), None);
        assert_eq!(bearer_token("Bearer"), None);
        assert_eq!(bearer_token(""), None);
    }
}
