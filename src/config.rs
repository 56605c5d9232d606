use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub security: SecurityConfig,

    pub session: SessionConfig,

    pub tokens: OneTimeTokenConfig,

    pub email: EmailConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 2)
    /// Set to 0 to use the number of CPU cores
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            database_path: "sqlite:data/gatehouse.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 2,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub enabled: bool,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 7070,
            cors_allowed_origins: vec![
                "http://localhost:7070".to_string(),
                "http://127.0.0.1:7070".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 65536 = 64MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,

    /// Failed-attempt tracking and account lockout policy.
    pub lockout: LockoutConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 1,
            lockout: LockoutConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failed attempts before the account is locked.
    pub max_failed_attempts: u32,

    /// How long a triggered lockout lasts.
    pub lockout_minutes: i64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HMAC secret for signing session tokens.
    /// Override this in production; the default exists for local development.
    pub secret: String,

    /// Session token lifetime in minutes.
    pub token_ttl_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret: "gatehouse-dev-secret-change-me".to_string(),
            token_ttl_minutes: 480,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OneTimeTokenConfig {
    /// Hours before an unconsumed one-time token expires.
    /// 0 disables expiry (tokens stay valid until consumed or reissued).
    pub ttl_hours: i64,
}

impl Default for OneTimeTokenConfig {
    fn default() -> Self {
        Self { ttl_hours: 48 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Base URL used to compose first-login links sent to new users.
    pub frontend_base_url: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            frontend_base_url: "http://localhost:7070".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,

    pub loki_labels: std::collections::HashMap<String, String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        let mut labels = std::collections::HashMap::new();
        labels.insert("app".to_string(), "gatehouse".to_string());

        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
            loki_labels: labels,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            server: ServerConfig::default(),
            security: SecurityConfig::default(),
            session: SessionConfig::default(),
            tokens: OneTimeTokenConfig::default(),
            email: EmailConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let paths = Self::config_paths();

        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                return Self::load_from_path(path);
            }
        }

        info!("No config file found, using defaults");
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("gatehouse").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".gatehouse").join("config.toml"));
        }

        paths
    }

    fn default_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }

    pub fn create_default_if_missing() -> Result<bool> {
        let path = Self::default_config_path();
        if path.exists() {
            Ok(false)
        } else {
            let config = Self::default();
            config.save_to_path(&path)?;
            info!("Created default config file: {}", path.display());
            Ok(true)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.secret.len() < 16 {
            anyhow::bail!("Session secret must be at least 16 characters");
        }

        if self.session.token_ttl_minutes <= 0 {
            anyhow::bail!("Session token TTL must be positive");
        }

        if self.security.lockout.max_failed_attempts == 0 {
            anyhow::bail!("Lockout threshold must be at least 1");
        }

        if self.security.argon2_memory_cost_kib < 8 || self.security.argon2_parallelism == 0 {
            anyhow::bail!("Argon2 parameters out of range");
        }

        if self.tokens.ttl_hours < 0 {
            anyhow::bail!("One-time token TTL cannot be negative");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.security.lockout.max_failed_attempts, 5);
        assert_eq!(config.security.lockout.lockout_minutes, 15);
        assert_eq!(config.security.argon2_memory_cost_kib, 65536);
        assert_eq!(config.session.token_ttl_minutes, 480);
        assert_eq!(config.tokens.ttl_hours, 48);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[security]"));
        assert!(toml_str.contains("[session]"));
        assert!(toml_str.contains("[security.lockout]"));
    }

    #[test]
    fn test_config_deserialization() {
        let toml_str = r#"
            [general]
            log_level = "debug"

            [security.lockout]
            max_failed_attempts = 3
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.security.lockout.max_failed_attempts, 3);

        assert_eq!(config.session.token_ttl_minutes, 480);
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let mut config = Config::default();
        config.session.secret = "short".to_string();
        assert!(config.validate().is_err());
    }
}
