//! # brain-core
//!
//! Core types, traits, and cross-store consistency for brain notes.
//!
//! Notes live in a relational store of record and are projected into a graph
//! of note and keyword nodes. This crate holds the models, the repository
//! traits, the composite unit of work that commits both stores together, the
//! text change engine deciding when a keyword resync is needed, and the note
//! services that drive it all. `brain-db` provides the PostgreSQL backends.
//!
//! ## Logging
//!
//! Events are emitted with `tracing` and carry `subsystem` (`uow`, `notes`,
//! `sync`, `db`), `component` and `op` fields plus entity ids.
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Partial commits that need reconciliation |
//! | WARN  | Rollbacks, failed closes, units of work dropped while active |
//! | INFO  | Completed note operations with `duration_ms` |
//! | DEBUG | Resync decisions, flush delegation, keyword cleanup |
//! | TRACE | Per-backend begin/commit/rollback steps |

pub mod defaults;
pub mod error;
pub mod keywords;
pub mod models;
pub mod services;
pub mod sync;
pub mod test_fixtures;
pub mod text;
pub mod traits;
pub mod uow;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use keywords::{collect_cleanup_keyword_names, removed_keyword_names};
pub use models::*;
pub use services::NoteService;
pub use sync::{resync_decision, NoteKeywordSync, ResyncReason, SyncDecision, SyncOutcome};
pub use traits::*;
pub use uow::{
    CompositeUnitOfWork, TransactionController, TxContext, UnitOfWorkFactory, UowState,
};
pub use uuid_utils::{is_v7, new_v7};
