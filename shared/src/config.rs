use std::env;

use tracing::info;

/// `DATABASE_URL` value that selects the in-process store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// DynamoDB endpoint URL, or `memory://`.
    pub database_url: String,
    /// Table holding every collection.
    pub db_name: String,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &'static str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let database_url = required("DATABASE_URL")?;
        let db_name = required("DB_NAME")?;
        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| {
                info!("CORS_ORIGINS not set, allowing any origin");
                "*".to_string()
            })
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            database_url,
            db_name,
            cors_origins,
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn reads_all_values() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "http://localhost:8000"),
            ("DB_NAME", "gradebook"),
            ("CORS_ORIGINS", "https://a.example, https://b.example,"),
        ]))
        .expect("config");

        assert_eq!(config.database_url, "http://localhost:8000");
        assert_eq!(config.db_name, "gradebook");
        assert_eq!(
            config.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(!config.uses_memory_store());
    }

    #[test]
    fn cors_defaults_to_wildcard() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", MEMORY_DATABASE_URL),
            ("DB_NAME", "gradebook"),
        ]))
        .expect("config");
        assert_eq!(config.cors_origins, vec!["*".to_string()]);
        assert!(config.uses_memory_store());
    }

    #[test]
    fn missing_database_settings_are_fatal() {
        assert_eq!(
            Config::from_lookup(lookup(&[("DB_NAME", "gradebook")])),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
        assert_eq!(
            Config::from_lookup(lookup(&[("DATABASE_URL", "memory://"), ("DB_NAME", " ")])),
            Err(ConfigError::Missing("DB_NAME"))
        );
    }
}
