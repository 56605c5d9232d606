use anyhow::{Context, Result};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tokio::task;

use crate::config::SecurityConfig;

/// Passwords rejected outright regardless of character-class score.
/// Compared case-insensitively.
const BLACKLIST: [&str; 15] = [
    "password",
    "Password1",
    "123456",
    "12345678",
    "qwerty",
    "abc123",
    "password123",
    "admin",
    "letmein",
    "welcome",
    "monkey",
    "1234567890",
    "password1",
    "123456789",
    "welcome123",
];

const MIN_LENGTH: usize = 8;
const MAX_LENGTH: usize = 128;
const TEMPORARY_PASSWORD_LENGTH: usize = 12;

const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DIGITS: &[u8] = b"0123456789";
const SPECIAL: &[u8] = b"!@#$%^&*";

/// Hash a password using Argon2id with optional custom params.
/// If config is None, uses the library defaults.
pub fn hash_password(password: &str, config: Option<&SecurityConfig>) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    let argon2 = if let Some(cfg) = config {
        let params = Params::new(
            cfg.argon2_memory_cost_kib,
            cfg.argon2_time_cost,
            cfg.argon2_parallelism,
            None, // output length (use default)
        )
        .map_err(|e| anyhow::anyhow!("Invalid Argon2 params: {e}"))?;
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    } else {
        Argon2::default()
    };

    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;

    Ok(hash.to_string())
}

/// Hash on a blocking task so the Argon2 work does not stall the runtime.
pub async fn hash_password_async(
    password: &str,
    config: Option<&SecurityConfig>,
) -> Result<String> {
    let password = password.to_string();
    let config = config.cloned();

    task::spawn_blocking(move || hash_password(&password, config.as_ref()))
        .await
        .context("Password hashing task panicked")?
}

/// Verify a password against a stored hash on a blocking task.
/// The hash encodes its own params, so no config is needed here.
pub async fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();

    task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&password_hash)
            .map_err(|e| anyhow::anyhow!("Invalid password hash format: {e}"))?;

        let argon2 = Argon2::default();
        Ok::<bool, anyhow::Error>(
            argon2
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok(),
        )
    })
    .await
    .context("Password verification task panicked")?
}

/// Check a candidate password against the strength policy. Returns a
/// message suitable for showing to the user on rejection.
pub fn validate_new_password(password: &str) -> Result<(), String> {
    let length = password.chars().count();
    if !(MIN_LENGTH..=MAX_LENGTH).contains(&length) {
        return Err(format!(
            "Password must be between {MIN_LENGTH} and {MAX_LENGTH} characters"
        ));
    }

    if password.trim() != password {
        return Err("Password must not start or end with whitespace".to_string());
    }

    if BLACKLIST.iter().any(|p| p.eq_ignore_ascii_case(password)) {
        return Err("Password is too common, choose a different one".to_string());
    }

    let mut has_lower = false;
    let mut has_upper = false;
    let mut has_digit = false;
    let mut has_special = false;
    for c in password.chars() {
        if c.is_lowercase() {
            has_lower = true;
        } else if c.is_uppercase() {
            has_upper = true;
        } else if c.is_numeric() {
            has_digit = true;
        } else {
            has_special = true;
        }
    }

    let classes = [has_lower, has_upper, has_digit, has_special]
        .iter()
        .filter(|&&b| b)
        .count();
    if classes < 3 {
        return Err(
            "Password must include at least 3 of: lowercase, uppercase, digits, special characters"
                .to_string(),
        );
    }

    Ok(())
}

/// Generate a temporary password for a newly provisioned account:
/// 12 characters with at least one from each character class, shuffled.
#[must_use]
pub fn generate_temporary_password() -> String {
    use rand::Rng;
    use rand::seq::SliceRandom;

    let mut rng = rand::rng();
    let mut chars: Vec<char> = Vec::with_capacity(TEMPORARY_PASSWORD_LENGTH);

    for set in [LOWER, UPPER, DIGITS, SPECIAL] {
        chars.push(set[rng.random_range(0..set.len())] as char);
    }

    let all: Vec<u8> = [LOWER, UPPER, DIGITS, SPECIAL].concat();
    while chars.len() < TEMPORARY_PASSWORD_LENGTH {
        chars.push(all[rng.random_range(0..all.len())] as char);
    }

    chars.shuffle(&mut rng);
    chars.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_and_verify_round_trip() {
        let hash = hash_password("Str0ng!Pass", None).unwrap();
        assert!(hash.starts_with("$argon2id$"));

        assert!(verify_password("Str0ng!Pass", &hash).await.unwrap());
        assert!(!verify_password("wrong", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_rejects_malformed_hash() {
        assert!(verify_password("anything", "not-a-hash").await.is_err());
    }

    #[test]
    fn test_hash_with_custom_params() {
        let config = SecurityConfig {
            argon2_memory_cost_kib: 8192,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..SecurityConfig::default()
        };
        let hash = hash_password("Str0ng!Pass", Some(&config)).unwrap();
        assert!(hash.contains("m=8192"));
    }

    #[test]
    fn test_validate_accepts_strong_password() {
        assert!(validate_new_password("Str0ng!Pass").is_ok());
        assert!(validate_new_password("NewSecure@Pass1").is_ok());
    }

    #[test]
    fn test_validate_rejects_length() {
        assert!(validate_new_password("Ab1!").is_err());
        assert!(validate_new_password(&"Aa1!".repeat(33)).is_err());
    }

    #[test]
    fn test_validate_rejects_edge_whitespace() {
        assert!(validate_new_password(" Str0ng!Pass").is_err());
        assert!(validate_new_password("Str0ng!Pass ").is_err());
    }

    #[test]
    fn test_validate_rejects_blacklisted() {
        assert!(validate_new_password("Password1").is_err());
        assert!(validate_new_password("password123").is_err());
        assert!(validate_new_password("WELCOME123").is_err());
    }

    #[test]
    fn test_validate_requires_three_classes() {
        assert!(validate_new_password("alllowercase1").is_err());
        assert!(validate_new_password("Twoclasses").is_err());
        assert!(validate_new_password("Threeclasses1").is_ok());
    }

    #[test]
    fn test_temporary_password_shape() {
        for _ in 0..20 {
            let password = generate_temporary_password();
            assert_eq!(password.len(), TEMPORARY_PASSWORD_LENGTH);
            assert!(password.chars().any(|c| c.is_ascii_lowercase()));
            assert!(password.chars().any(|c| c.is_ascii_uppercase()));
            assert!(password.chars().any(|c| c.is_ascii_digit()));
            assert!(password.chars().any(|c| SPECIAL.contains(&(c as u8))));
            assert!(validate_new_password(&password).is_ok());
        }
    }

    #[test]
    fn test_temporary_passwords_differ() {
        assert_ne!(generate_temporary_password(), generate_temporary_password());
    }
}
