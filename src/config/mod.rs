//! Configuration management
//!
//! This module handles loading and parsing configuration for the vending service.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Token and session configuration
    #[serde(default)]
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/vendo.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Token signing and session policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Shared HMAC secret for token signing. When unset, a random
    /// per-process key is generated at startup.
    #[serde(default)]
    pub secret: Option<String>,
    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_ttl_secs")]
    pub access_token_ttl_secs: i64,
    /// Refresh token lifetime in days
    #[serde(default = "default_refresh_token_ttl_days")]
    pub refresh_token_ttl_days: i64,
    /// A login is refused while another valid session younger than this exists
    #[serde(default = "default_session_reuse_window_days")]
    pub session_reuse_window_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: None,
            access_token_ttl_secs: default_access_token_ttl_secs(),
            refresh_token_ttl_days: default_refresh_token_ttl_days(),
            session_reuse_window_days: default_session_reuse_window_days(),
        }
    }
}

impl AuthConfig {
    pub fn access_token_ttl(&self) -> Duration {
        Duration::seconds(self.access_token_ttl_secs)
    }

    pub fn refresh_token_ttl(&self) -> Duration {
        Duration::days(self.refresh_token_ttl_days)
    }

    pub fn session_reuse_window(&self) -> Duration {
        Duration::days(self.session_reuse_window_days)
    }
}

/// Upper bound for the access token lifetime (30 days)
pub const MAX_ACCESS_TOKEN_TTL_SECS: i64 = 30 * 24 * 60 * 60;

/// Upper bound for day-based auth settings (about ten years)
pub const MAX_AUTH_DAYS: i64 = 3650;

fn default_access_token_ttl_secs() -> i64 {
    60 * 60
}

fn default_refresh_token_ttl_days() -> i64 {
    365
}

fn default_session_reuse_window_days() -> i64 {
    365
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern:
    /// - VENDO_SERVER_HOST
    /// - VENDO_SERVER_PORT
    /// - VENDO_DATABASE_DRIVER
    /// - VENDO_DATABASE_URL
    /// - VENDO_AUTH_SECRET
    /// - VENDO_AUTH_ACCESS_TOKEN_TTL_SECS
    /// - VENDO_AUTH_REFRESH_TOKEN_TTL_DAYS
    /// - VENDO_AUTH_SESSION_REUSE_WINDOW_DAYS
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the services cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.access_token_ttl_secs <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.access_token_ttl_secs must be positive".to_string(),
            ));
        }
        if self.auth.access_token_ttl_secs > MAX_ACCESS_TOKEN_TTL_SECS {
            return Err(ConfigError::ValidationError(format!(
                "auth.access_token_ttl_secs cannot exceed {}",
                MAX_ACCESS_TOKEN_TTL_SECS
            )));
        }
        if self.auth.refresh_token_ttl_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.refresh_token_ttl_days must be positive".to_string(),
            ));
        }
        if self.auth.session_reuse_window_days < 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_reuse_window_days cannot be negative".to_string(),
            ));
        }
        if self.auth.refresh_token_ttl_days > MAX_AUTH_DAYS {
            return Err(ConfigError::ValidationError(format!(
                "auth.refresh_token_ttl_days cannot exceed {}",
                MAX_AUTH_DAYS
            )));
        }
        if self.auth.session_reuse_window_days > MAX_AUTH_DAYS {
            return Err(ConfigError::ValidationError(format!(
                "auth.session_reuse_window_days cannot exceed {}",
                MAX_AUTH_DAYS
            )));
        }
        if matches!(self.auth.secret.as_deref(), Some(s) if s.is_empty()) {
            return Err(ConfigError::ValidationError(
                "auth.secret cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("VENDO_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("VENDO_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        if let Ok(driver) = std::env::var("VENDO_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("VENDO_DATABASE_URL") {
            self.database.url = url;
        }

        if let Ok(secret) = std::env::var("VENDO_AUTH_SECRET") {
            self.auth.secret = Some(secret);
        }
        if let Ok(ttl) = std::env::var("VENDO_AUTH_ACCESS_TOKEN_TTL_SECS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.auth.access_token_ttl_secs = ttl;
            }
        }
        if let Ok(ttl) = std::env::var("VENDO_AUTH_REFRESH_TOKEN_TTL_DAYS") {
            if let Ok(ttl) = ttl.parse::<i64>() {
                self.auth.refresh_token_ttl_days = ttl;
            }
        }
        if let Ok(window) = std::env::var("VENDO_AUTH_SESSION_REUSE_WINDOW_DAYS") {
            if let Ok(window) = window.parse::<i64>() {
                self.auth.session_reuse_window_days = window;
            }
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for all config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn valid_auth_strategy() -> impl Strategy<Value = AuthConfig> {
        (
            proptest::option::of("k[a-zA-Z0-9]{8,32}"),
            1i64..100_000,
            1i64..1000,
            0i64..1000,
        )
            .prop_map(|(secret, access, refresh, window)| AuthConfig {
                secret,
                access_token_ttl_secs: access,
                refresh_token_ttl_days: refresh,
                session_reuse_window_days: window,
            })
    }

    fn valid_config_strategy() -> impl Strategy<Value = Config> {
        (
            "h[a-z0-9.]{0,19}",
            1u16..=65535,
            prop_oneof![Just(DatabaseDriver::Sqlite), Just(DatabaseDriver::Mysql)],
            "db/[a-z0-9_]{1,20}\\.db",
            valid_auth_strategy(),
        )
            .prop_map(|(host, port, driver, url, auth)| Config {
                server: ServerConfig { host, port },
                database: DatabaseConfig { driver, url },
                auth,
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serializing any valid config to YAML and loading it back yields
        /// the same settings.
        #[test]
        fn config_yaml_roundtrip(config in valid_config_strategy()) {
            let yaml = serde_yaml::to_string(&config).expect("Failed to serialize config");

            let mut file = NamedTempFile::new().expect("Failed to create temp file");
            write!(file, "{}", yaml).expect("Failed to write config");

            let parsed = Config::load(file.path()).expect("Failed to parse config");

            prop_assert_eq!(config.server.host, parsed.server.host);
            prop_assert_eq!(config.server.port, parsed.server.port);
            prop_assert_eq!(config.database.driver, parsed.database.driver);
            prop_assert_eq!(config.database.url, parsed.database.url);
            prop_assert_eq!(config.auth.secret, parsed.auth.secret);
            prop_assert_eq!(config.auth.access_token_ttl_secs, parsed.auth.access_token_ttl_secs);
            prop_assert_eq!(config.auth.refresh_token_ttl_days, parsed.auth.refresh_token_ttl_days);
            prop_assert_eq!(config.auth.session_reuse_window_days, parsed.auth.session_reuse_window_days);
        }
    }
}
