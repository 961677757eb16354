//! # brain-db
//!
//! PostgreSQL backends for brain.
//!
//! This crate provides:
//! - Connection pools for the relational store and the graph projection
//! - Transaction controllers plugging both stores into the composite unit of work
//! - Repository implementations for notes, keywords and the graph
//!
//! ## Example
//!
//! ```rust,ignore
//! use brain_db::{Database, DatabaseConfig};
//! use brain_core::CreateNote;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect(&DatabaseConfig::from_env()?).await?;
//!     let notes = db.note_service();
//!
//!     let id = notes.create_note(CreateNote {
//!         user_id: uuid::Uuid::new_v4(),
//!         title: Some("Roadmap".to_string()),
//!         text: Some("Ship [[Infra]] first".to_string()),
//!     }).await?;
//!
//!     println!("Created note: {}", id);
//!     Ok(())
//! }
//! ```
pub mod config;
pub mod controllers;
pub mod graph;
pub mod keywords;
pub mod notes;
pub mod pool;

// Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

use std::sync::Arc;

use sqlx::PgPool;

// Re-export core types
pub use brain_core::*;

pub use config::DatabaseConfig;
pub use controllers::{GraphController, PgTransaction, SqlController};
pub use graph::PgGraphRepository;
pub use keywords::PgKeywordRepository;
pub use notes::PgNoteRepository;
pub use pool::{create_pool, log_pool_metrics, PoolConfig, PoolHealth, Store};

/// Escape LIKE/ILIKE wildcard characters (`%`, `_`, `\`) in user input.
pub fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Both stores with their controllers and repositories.
#[derive(Clone)]
pub struct Database {
    /// Pool of the relational store of record.
    pub pool: PgPool,
    /// Pool of the graph projection; never the relational pool.
    pub graph_pool: PgPool,
    /// Eager controller of the relational store.
    pub sql: Arc<SqlController>,
    /// Lazy controller of the graph projection.
    pub graph: Arc<GraphController>,
    pub notes: Arc<PgNoteRepository>,
    pub keywords: Arc<PgKeywordRepository>,
    pub graph_repo: Arc<PgGraphRepository>,
}

impl Database {
    /// Wire controllers and repositories over existing pools.
    pub fn new(pool: PgPool, graph_pool: PgPool) -> Self {
        let sql = Arc::new(SqlController::new(pool.clone()));
        let graph = Arc::new(GraphController::new(graph_pool.clone()));
        Self {
            notes: Arc::new(PgNoteRepository::new(sql.clone())),
            keywords: Arc::new(PgKeywordRepository::new(sql.clone())),
            graph_repo: Arc::new(PgGraphRepository::new(graph.clone())),
            sql,
            graph,
            pool,
            graph_pool,
        }
    }

    /// Connect both stores, each through its own pool.
    ///
    /// A write holds its relational connection while the graph transaction
    /// opens, so the graph must not draw from the relational pool even when
    /// both stores live in one database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = create_pool(&config.database_url, &config.pool, Store::Relational).await?;
        let graph_pool =
            create_pool(&config.graph_database_url, &config.pool, Store::Graph).await?;
        Ok(Self::new(pool, graph_pool))
    }

    /// Connect using [`DatabaseConfig::from_env`].
    pub async fn from_env() -> Result<Self> {
        Self::connect(&DatabaseConfig::from_env()?).await
    }

    /// Units of work over both stores: relational first, then the graph.
    pub fn uow_factory(&self) -> UnitOfWorkFactory {
        let sql = self.sql.clone();
        let graph = self.graph.clone();
        Arc::new(move || {
            CompositeUnitOfWork::new(vec![
                sql.clone() as Arc<dyn TransactionController>,
                graph.clone() as Arc<dyn TransactionController>,
            ])
        })
    }

    /// Note service backed by these stores.
    pub fn note_service(&self) -> NoteService {
        NoteService::new(
            self.notes.clone(),
            self.graph_repo.clone(),
            self.keywords.clone(),
            self.uow_factory(),
        )
    }

    /// Run pending migrations of both stores.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        // Both migrators may share one `_sqlx_migrations` table.
        let mut relational = sqlx::migrate!("../../migrations/relational");
        relational.set_ignore_missing(true);
        relational
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;

        let mut graph = sqlx::migrate!("../../migrations/graph");
        graph.set_ignore_missing(true);
        graph
            .run(&self.graph_pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Log the health of both pools.
    pub fn log_pool_metrics(&self) -> (PoolHealth, PoolHealth) {
        (
            log_pool_metrics(&self.pool, Store::Relational),
            log_pool_metrics(&self.graph_pool, Store::Graph),
        )
    }
}
