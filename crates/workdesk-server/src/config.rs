//! Configuration management for the Workdesk server

use anyhow::{Context, Result};
use serde::Deserialize;
use workdesk::CoreConfig;

/// Placeholder secret accepted only in development
pub const DEV_JWT_SECRET: &str = "workdesk-development-secret";

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server host (default: 0.0.0.0)
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum database connections (default: 10)
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// HMAC secret for access and refresh tokens
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Access token lifetime in minutes (default: 7 days)
    #[serde(default = "default_jwt_expire_minutes")]
    pub jwt_expire_minutes: i64,

    /// Refresh token lifetime in days (default: 30)
    #[serde(default = "default_refresh_token_days")]
    pub refresh_token_days: i64,

    /// Per-user storage ceiling in bytes (default: 10 GiB)
    #[serde(default = "default_storage_quota_bytes")]
    pub storage_quota_bytes: i64,

    /// development | production
    #[serde(default = "default_app_env")]
    pub app_env: String,

    /// Emit JSON log lines instead of the human format
    #[serde(default)]
    pub log_json: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "sqlite://./data/workdesk.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_jwt_secret() -> String {
    DEV_JWT_SECRET.to_string()
}

fn default_jwt_expire_minutes() -> i64 {
    7 * 24 * 60
}

fn default_refresh_token_days() -> i64 {
    30
}

fn default_storage_quota_bytes() -> i64 {
    CoreConfig::default().storage_quota_bytes
}

fn default_app_env() -> String {
    "development".to_string()
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let config = Self {
            host: std::env::var("WORKDESK_HOST").unwrap_or_else(|_| default_host()),
            port: parse_var("WORKDESK_PORT", default_port())?,
            database_url: std::env::var("DATABASE_URL").unwrap_or_else(|_| default_database_url()),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", default_max_connections())?,
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| default_jwt_secret()),
            jwt_expire_minutes: parse_var("JWT_EXPIRE_MINUTES", default_jwt_expire_minutes())?,
            refresh_token_days: parse_var("REFRESH_TOKEN_DAYS", default_refresh_token_days())?,
            storage_quota_bytes: parse_var("STORAGE_QUOTA_BYTES", default_storage_quota_bytes())?,
            app_env: std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env()),
            log_json: std::env::var("LOG_FORMAT")
                .map(|s| s.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }

    fn validate(&self) -> Result<()> {
        match self.app_env.as_str() {
            "development" | "production" | "test" => {}
            other => anyhow::bail!(
                "Invalid APP_ENV '{}'. Must be one of: development, production, test",
                other
            ),
        }
        if !self.is_development() && self.jwt_secret == DEV_JWT_SECRET {
            anyhow::bail!("JWT_SECRET must be set outside development");
        }
        if self.jwt_secret.is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }
        if self.jwt_expire_minutes <= 0 || self.refresh_token_days <= 0 {
            anyhow::bail!("Token lifetimes must be positive");
        }
        if self.storage_quota_bytes <= 0 {
            anyhow::bail!("STORAGE_QUOTA_BYTES must be positive");
        }
        Ok(())
    }

    /// Settings handed to the core services
    pub fn core(&self) -> CoreConfig {
        CoreConfig::default().with_storage_quota(self.storage_quota_bytes)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            jwt_secret: default_jwt_secret(),
            jwt_expire_minutes: default_jwt_expire_minutes(),
            refresh_token_days: default_refresh_token_days(),
            storage_quota_bytes: default_storage_quota_bytes(),
            app_env: default_app_env(),
            log_json: false,
        }
    }
}
