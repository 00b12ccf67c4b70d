//! Application settings loaded from `config.toml` and the environment.
//!
//! Every field has a default, so the service starts without any file at all.
//! `DATABASE_URL` and `BIND_ADDRESS` from the environment (or `.env`) override
//! whatever the file says.

use crate::config::database::DEFAULT_DATABASE_URL;
use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Two weeks, the usual lifetime of a web login.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 14 * 24 * 60 * 60;

/// Runtime configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// `SeaORM` connection string
    pub database_url: String,
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// How many transactions dashboards and detail views show
    pub recent_transactions_limit: u64,
    /// Upper bound for a single award or award correction; `None` means no cap
    pub max_award_amount: Option<i64>,
    /// Lifetime of a login session in seconds
    pub session_ttl_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_address: "0.0.0.0:8000".to_string(),
            recent_transactions_limit: 10,
            max_award_amount: None,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl AppConfig {
    /// Session lifetime as a [`Duration`].
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Applies `DATABASE_URL` / `BIND_ADDRESS` overrides from the environment.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database_url = url;
        }
        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            self.bind_address = addr;
        }
        self
    }
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read, the TOML syntax is invalid or a
/// field has the wrong type.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;

    toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse {}: {e}", path.display()),
    })
}

/// Loads the application configuration.
///
/// Reads the file named by `IQCOIN_CONFIG`, else `./config.toml` if it exists,
/// else uses defaults; then applies environment overrides.
pub fn load_app_configuration() -> Result<AppConfig> {
    let config = match std::env::var("IQCOIN_CONFIG") {
        Ok(path) => load_config(path)?,
        Err(_) if Path::new("config.toml").exists() => load_config("config.toml")?,
        Err(_) => {
            info!("No config file found, using defaults");
            AppConfig::default()
        }
    };
    Ok(config.with_env_overrides())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            database_url = "sqlite::memory:"
            bind_address = "127.0.0.1:9000"
            recent_transactions_limit = 5
            max_award_amount = 3
            session_ttl_secs = 3600
        "#;

        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.recent_transactions_limit, 5);
        assert_eq!(config.max_award_amount, Some(3));
        assert_eq!(config.session_ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: AppConfig = toml::from_str("bind_address = \"127.0.0.1:1\"").unwrap();
        assert_eq!(config.bind_address, "127.0.0.1:1");
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.recent_transactions_limit, 10);
        assert_eq!(config.max_award_amount, None);
        assert_eq!(config.session_ttl_secs, DEFAULT_SESSION_TTL_SECS);
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "recent_transactions_limit = 25").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.recent_transactions_limit, 25);
    }

    #[test]
    fn test_load_config_reports_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "recent_transactions_limit = \"many\"").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }
}
