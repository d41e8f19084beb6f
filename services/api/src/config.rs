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

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which document store backs the pantry. Chosen once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    /// Local-only mock store for development.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" | "mock" => Ok(StoreBackend::Memory),
            other => Err(format!("'{}' is not a known backend (postgres, memory)", other)),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub backend: StoreBackend,
    pub database_url: Option<String>,
    pub mock_store_path: Option<PathBuf>,
    pub log_level: Level,
    pub cors_origin: String,
    pub session_ttl_days: i64,
    pub max_upload_bytes: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // --- Server Settings ---
        let bind_address = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000")?;

        // --- Storage Settings ---
        let backend = parse_or(&lookup, "PANTRY_BACKEND", "postgres")?;
        let database_url = lookup("DATABASE_URL");
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }
        let mock_store_path = lookup("MOCK_STORE_PATH").map(PathBuf::from);

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Web Settings ---
        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:5173".to_string());
        let session_ttl_days: i64 = parse_or(&lookup, "SESSION_TTL_DAYS", "30")?;
        if session_ttl_days <= 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_DAYS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", "10485760")?;

        Ok(Self {
            bind_address,
            backend,
            database_url,
            mock_store_path,
            log_level,
            cors_origin,
            session_ttl_days,
            max_upload_bytes,
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn postgres_requires_database_url() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(v)) if v == "DATABASE_URL"));
        let config = load(&[("DATABASE_URL", "postgres://localhost/pantry")]).unwrap();
        assert_eq!(config.backend, StoreBackend::Postgres);
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.session_ttl_days, 30);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn memory_backend_needs_no_database() {
        let config = load(&[
            ("PANTRY_BACKEND", "memory"),
            ("MOCK_STORE_PATH", "/tmp/pantry.json"),
            ("RUST_LOG", "debug"),
        ])
        .unwrap();
        assert_eq!(config.backend, StoreBackend::Memory);
        assert_eq!(config.mock_store_path, Some(PathBuf::from("/tmp/pantry.json")));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            load(&[("PANTRY_BACKEND", "firebase")]),
            Err(ConfigError::InvalidValue(k, _)) if k == "PANTRY_BACKEND"
        ));
        assert!(matches!(
            load(&[("PANTRY_BACKEND", "memory"), ("SESSION_TTL_DAYS", "0")]),
            Err(ConfigError::InvalidValue(k, _)) if k == "SESSION_TTL_DAYS"
        ));
        assert!(matches!(
            load(&[("PANTRY_BACKEND", "memory"), ("BIND_ADDRESS", "nowhere")]),
            Err(ConfigError::InvalidValue(k, _)) if k == "BIND_ADDRESS"
        ));
    }
}
