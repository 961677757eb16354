//! Database configuration from the environment.

use brain_core::{Error, Result};

use crate::pool::{PoolConfig, DEFAULT_MAX_CONNECTIONS};

/// Connection URL of the relational store.
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Connection URL of the graph projection; falls back to [`DATABASE_URL_ENV`].
pub const GRAPH_DATABASE_URL_ENV: &str = "GRAPH_DATABASE_URL";

/// Pool size applied to both stores.
pub const DB_MAX_CONNECTIONS_ENV: &str = "DB_MAX_CONNECTIONS";

/// Where and how to connect both stores.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub graph_database_url: String,
    pub pool: PoolConfig,
}

impl DatabaseConfig {
    /// Both stores in one database.
    pub fn new(database_url: impl Into<String>) -> Self {
        let database_url = database_url.into();
        Self {
            graph_database_url: database_url.clone(),
            database_url,
            pool: PoolConfig::default(),
        }
    }

    pub fn with_graph_url(mut self, url: impl Into<String>) -> Self {
        self.graph_database_url = url.into();
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Read the configuration from the process environment, loading `.env`
    /// first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL_ENV)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{} is not set", DATABASE_URL_ENV)))?;
        let graph_database_url = lookup(GRAPH_DATABASE_URL_ENV)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| database_url.clone());

        let max_connections = match lookup(DB_MAX_CONNECTIONS_ENV) {
            Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
                Error::Config(format!(
                    "{} must be a positive integer, got '{}'",
                    DB_MAX_CONNECTIONS_ENV, raw
                ))
            })?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        if max_connections == 0 {
            return Err(Error::Config(format!(
                "{} must be a positive integer, got '0'",
                DB_MAX_CONNECTIONS_ENV
            )));
        }

        Ok(Self {
            database_url,
            graph_database_url,
            pool: PoolConfig::default().with_max_connections(max_connections),
        })
    }

    /// Whether both stores live in the same database.
    pub fn shares_database(&self) -> bool {
        self.database_url == self.graph_database_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_graph_url_defaults_to_database_url() {
        let config = DatabaseConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://a/db")]))
            .unwrap();
        assert_eq!(config.graph_database_url, "postgres://a/db");
        assert!(config.shares_database());
        assert_eq!(config.pool.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn test_separate_graph_url_and_pool_size() {
        let config = DatabaseConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://a/db"),
            ("GRAPH_DATABASE_URL", "postgres://b/graph"),
            ("DB_MAX_CONNECTIONS", "25"),
        ]))
        .unwrap();
        assert_eq!(config.graph_database_url, "postgres://b/graph");
        assert!(!config.shares_database());
        assert_eq!(config.pool.max_connections, 25);
    }

    #[test]
    fn test_missing_database_url() {
        let err = DatabaseConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_pool_size() {
        for bad in ["zero", "0", "-3"] {
            let err = DatabaseConfig::from_lookup(lookup(&[
                ("DATABASE_URL", "postgres://a/db"),
                ("DB_MAX_CONNECTIONS", bad),
            ]))
            .unwrap_err();
            assert!(matches!(err, Error::Config(_)), "accepted {}", bad);
        }
    }

    #[test]
    fn test_builder() {
        let config = DatabaseConfig::new("postgres://a/db")
            .with_graph_url("postgres://b/graph")
            .with_pool(PoolConfig::new().with_max_connections(3));
        assert_eq!(config.pool.max_connections, 3);
        assert!(!config.shares_database());
    }
}
