//! Cross-store unit of work.
//!
//! - [`TxContext`]: per-operation handle registry
//! - [`TransactionController`]: lifecycle of one backend
//! - [`CompositeUnitOfWork`]: ordered commit/rollback across backends

pub mod composite;
pub mod context;
pub mod controller;

pub use composite::{CompositeUnitOfWork, UnitOfWorkFactory, UowState};
pub use context::{Handle, TxContext};
pub use controller::TransactionController;
