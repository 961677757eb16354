//! Connection pools for the relational store and the graph projection.

use std::fmt;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use brain_core::{Error, Result};

/// Default maximum number of connections per pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default time to wait for a free connection, in seconds.
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Which store a pool serves; labels pool log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Relational,
    Graph,
}

impl Store {
    pub fn as_str(&self) -> &'static str {
        match self {
            Store::Relational => "relational",
            Store::Graph => "graph",
        }
    }
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sizing and timeouts applied to each store's pool.
///
/// Each store gets its own pool, even when both share a database. One
/// operation holds at most one connection from each, so `max_connections`
/// bounds the operations in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    /// `None` keeps connections until they go idle.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(DEFAULT_ACQUIRE_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(30 * 60)),
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the pool; `min_connections` is lowered to fit.
    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self.min_connections = self.min_connections.min(n);
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }
}

/// Open the pool for one store.
pub async fn create_pool(database_url: &str, config: &PoolConfig, store: Store) -> Result<PgPool> {
    let start = Instant::now();
    debug!(
        subsystem = "db",
        component = "pool",
        op = "create",
        store = %store,
        max_connections = config.max_connections,
        acquire_timeout_secs = config.acquire_timeout.as_secs(),
        "Connecting pool"
    );

    let pool = config
        .options()
        .connect(database_url)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "db",
        component = "pool",
        op = "established",
        store = %store,
        pool_size = pool.size(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Pool ready"
    );
    Ok(pool)
}

/// Size and idle count of a pool at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolHealth {
    pub size: u32,
    pub idle: usize,
}

impl PoolHealth {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
        }
    }

    /// Every open connection is checked out; the next operation waits.
    pub fn is_exhausted(&self) -> bool {
        self.size > 0 && self.idle == 0
    }
}

/// Log pool health, warning when no idle connection is left.
pub fn log_pool_metrics(pool: &PgPool, store: Store) -> PoolHealth {
    let health = PoolHealth::of(pool);
    debug!(
        subsystem = "db",
        component = "pool",
        op = "metrics",
        store = %store,
        pool_size = health.size,
        pool_idle = health.idle,
        "Pool health"
    );
    if health.is_exhausted() {
        warn!(
            subsystem = "db",
            component = "pool",
            store = %store,
            pool_size = health.size,
            "No idle connections, units of work will wait for a connection"
        );
    }
    health
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.max_lifetime, Some(Duration::from_secs(1800)));
    }

    #[test]
    fn test_small_pool_lowers_minimum() {
        let config = PoolConfig::new()
            .with_max_connections(0)
            .with_acquire_timeout(Duration::from_secs(5))
            .with_max_lifetime(None);
        assert_eq!(config.min_connections, 0);
        assert_eq!(config.acquire_timeout, Duration::from_secs(5));
        assert_eq!(config.max_lifetime, None);
    }

    #[test]
    fn test_exhaustion() {
        assert!(PoolHealth { size: 3, idle: 0 }.is_exhausted());
        assert!(!PoolHealth { size: 3, idle: 1 }.is_exhausted());
        assert!(!PoolHealth { size: 0, idle: 0 }.is_exhausted());
    }

    #[test]
    fn test_store_labels() {
        assert_eq!(Store::Relational.to_string(), "relational");
        assert_eq!(Store::Graph.as_str(), "graph");
    }
}
