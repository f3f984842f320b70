//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use training_portal_core::PasscodePolicy;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When absent the service keeps remote records in memory.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub cache_dir: PathBuf,
    pub cache_key: String,
    pub cache_max_bytes: usize,
    pub passcode_policy: PasscodePolicy,
    pub cors_origin: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?;
        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Local Cache Settings ---
        let cache_dir = lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./.portal-cache"));
        let cache_key = lookup("CACHE_KEY").unwrap_or_else(|| "portal-state".to_string());
        let cache_max_bytes = parse_or(&lookup, "CACHE_MAX_BYTES", 5 * 1024 * 1024_usize)?;

        // --- Passcode Settings ---
        let passcode_min = parse_or(&lookup, "PASSCODE_MIN", 1000_u32)?;
        let passcode_max = parse_or(&lookup, "PASSCODE_MAX", 9999_u32)?;
        let valid_days = parse_or(&lookup, "PASSCODE_VALID_DAYS", 7_i64)?;
        let passcode_policy =
            PasscodePolicy::new(passcode_min, passcode_max, valid_days).map_err(|e| {
                ConfigError::InvalidValue(
                    "PASSCODE_MIN/PASSCODE_MAX/PASSCODE_VALID_DAYS".to_string(),
                    e.to_string(),
                )
            })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cache_dir,
            cache_key,
            cache_max_bytes,
            passcode_policy,
            cors_origin,
        })
    }
}

/// Parses `key` when set, otherwise returns `default`.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}
