//! Connection settings sourced from host configuration variables
//!
//! The host exposes two string settings, `mongodb_url` and
//! `mongodb_database`. Both default to the sentinel `changeme`, which means
//! "unset" and keeps the facade disabled.

use crate::connection::PoolConfig;
use docbridge_common::{DocBridgeError, Result};

/// Sentinel value meaning the setting was never configured
pub const UNSET: &str = "changeme";

/// Configuration variable holding the connection URL
pub const URL_VAR: &str = "mongodb_url";

/// Configuration variable holding the database name
pub const DATABASE_VAR: &str = "mongodb_database";

/// Connection settings for the facade
#[derive(Debug, Clone)]
pub struct Settings {
    pub url: String,
    pub database: String,
    pub pool: PoolConfig,
}

impl Settings {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            pool: PoolConfig::default(),
        }
    }

    /// Read settings through a host lookup function keyed by variable name
    ///
    /// Missing variables fall back to [`UNSET`].
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(URL_VAR).unwrap_or_else(|| UNSET.to_string());
        let database = lookup(DATABASE_VAR).unwrap_or_else(|| UNSET.to_string());
        Self::new(url, database)
    }

    /// Read settings from the `MONGODB_URL` and `MONGODB_DATABASE`
    /// environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name.to_uppercase()).ok())
    }

    /// Override the pool tuning
    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Names of the variables still holding the sentinel (or empty)
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_unset(&self.url) {
            missing.push(URL_VAR);
        }
        if is_unset(&self.database) {
            missing.push(DATABASE_VAR);
        }
        missing
    }

    /// Fails with a configuration error naming every unset variable
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing();
        if missing.is_empty() {
            return Ok(());
        }
        Err(DocBridgeError::Configuration(format!(
            "Convar(s) not set: {}",
            missing.join(", ")
        )))
    }
}

fn is_unset(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == UNSET
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_missing_variables_default_to_sentinel() {
        let settings = Settings::from_lookup(|_| None);
        assert_eq!(settings.url, UNSET);
        assert_eq!(settings.database, UNSET);
        assert_eq!(settings.missing(), vec![URL_VAR, DATABASE_VAR]);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_only_database_missing() {
        let settings = Settings::from_lookup(lookup_from(&[(URL_VAR, "mongodb://localhost:27017")]));
        assert_eq!(settings.missing(), vec![DATABASE_VAR]);
    }

    #[test]
    fn test_explicit_sentinel_is_unset() {
        let settings = Settings::new("changeme", "game");
        assert_eq!(settings.missing(), vec![URL_VAR]);
    }

    #[test]
    fn test_complete_settings() {
        let settings = Settings::from_lookup(lookup_from(&[
            (URL_VAR, "mongodb://localhost:27017"),
            (DATABASE_VAR, "game"),
        ]));
        assert!(settings.missing().is_empty());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_with_pool_replaces_tuning() {
        let pool = PoolConfig {
            max_pool_size: Some(5),
            ..PoolConfig::default()
        };
        let settings = Settings::new("mongodb://localhost:27017", "game").with_pool(pool);
        assert_eq!(settings.pool.max_pool_size, Some(5));
        assert_eq!(settings.pool.app_name, Some("docbridge".to_string()));
    }

    #[test]
    fn test_validate_names_missing_variables() {
        let err = Settings::new("", "changeme").validate().unwrap_err();
        assert!(matches!(err, DocBridgeError::Configuration(_)));
        let message = err.to_string();
        assert!(message.contains(URL_VAR));
        assert!(message.contains(DATABASE_VAR));
    }
}
