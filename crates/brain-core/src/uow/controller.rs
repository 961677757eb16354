//! Backend transaction controller interface.

use async_trait::async_trait;

use crate::error::Result;
use crate::uow::context::TxContext;

/// Drives the transaction lifecycle of one backend through a [`TxContext`].
///
/// The application has a fixed set of implementations: the eager relational
/// controller and the lazy graph controller in `brain-db`. Calling `commit`,
/// `rollback` or `close` on a controller that never started must be safe and
/// cheap.
#[async_trait]
pub trait TransactionController: Send + Sync {
    /// Stable key this backend uses in the context ("sql", "graph").
    fn backend_key(&self) -> &'static str;

    /// Called once when the unit of work is entered.
    async fn begin(&self, ctx: &mut TxContext) -> Result<()>;

    /// Start the backend transaction unless the context already records it.
    async fn ensure_started(&self, ctx: &mut TxContext) -> Result<()>;

    async fn commit(&self, ctx: &mut TxContext) -> Result<()>;

    async fn rollback(&self, ctx: &mut TxContext) -> Result<()>;

    /// Release backend resources held in the context.
    async fn close(&self, ctx: &mut TxContext) -> Result<()>;

    /// Whether [`flush`](Self::flush) does anything for this backend.
    fn supports_flush(&self) -> bool {
        false
    }

    /// Make pending writes take effect inside the open transaction.
    async fn flush(&self, _ctx: &mut TxContext) -> Result<()> {
        Ok(())
    }
}
