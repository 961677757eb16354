//! Composite unit of work spanning every registered backend.
//!
//! Commit runs in registration order (system of record first), teardown in
//! reverse order. A process crash between two backend commits can leave the
//! relational store committed and the graph projection behind; that gap is
//! closed by replaying the relational state, never the other way around.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use crate::defaults::PRIMARY_FLUSH_BACKEND;
use crate::error::{Error, Result};
use crate::uow::context::TxContext;
use crate::uow::controller::TransactionController;

/// Zero-argument constructor for a fresh unit of work per logical operation.
pub type UnitOfWorkFactory = Arc<dyn Fn() -> CompositeUnitOfWork + Send + Sync>;

/// Lifecycle state of a [`CompositeUnitOfWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UowState {
    Open,
    Active,
    Committed,
    RolledBack,
}

/// Coordinates begin/commit/rollback/close across backend controllers.
pub struct CompositeUnitOfWork {
    controllers: Vec<Arc<dyn TransactionController>>,
    ctx: TxContext,
    primary_flush_key: &'static str,
    state: UowState,
}

impl CompositeUnitOfWork {
    /// Create a unit of work over `controllers`, flushing through the sql backend.
    pub fn new(controllers: Vec<Arc<dyn TransactionController>>) -> Self {
        Self::with_primary_flush(controllers, PRIMARY_FLUSH_BACKEND)
    }

    /// Create a unit of work with an explicit primary flush backend.
    pub fn with_primary_flush(
        controllers: Vec<Arc<dyn TransactionController>>,
        primary_flush_key: &'static str,
    ) -> Self {
        Self {
            controllers,
            ctx: TxContext::new(),
            primary_flush_key,
            state: UowState::Open,
        }
    }

    pub fn state(&self) -> UowState {
        self.state
    }

    pub fn context(&self) -> &TxContext {
        &self.ctx
    }

    /// The context repositories use for this operation.
    pub fn context_mut(&mut self) -> &mut TxContext {
        &mut self.ctx
    }

    fn is_terminal(&self) -> bool {
        matches!(self.state, UowState::Committed | UowState::RolledBack)
    }

    /// Reset state, clear the context and begin every controller in order.
    pub async fn enter(&mut self) -> Result<()> {
        self.ctx.clear();
        self.state = UowState::Active;
        for controller in &self.controllers {
            trace!(
                subsystem = "uow",
                component = "composite",
                op = "begin",
                backend = controller.backend_key(),
                "Beginning backend"
            );
            controller.begin(&mut self.ctx).await?;
        }
        Ok(())
    }

    /// Commit every backend in registration order, then close all in reverse.
    ///
    /// Stops at the first failing commit. Backends committed before the
    /// failure stay committed and the error is reported as
    /// [`Error::PartialCommit`]. No-op once committed or rolled back.
    pub async fn commit(&mut self) -> Result<()> {
        if self.is_terminal() {
            debug!(
                subsystem = "uow",
                component = "composite",
                op = "commit",
                state = ?self.state,
                "Commit ignored, unit of work already finished"
            );
            return Ok(());
        }
        if self.state == UowState::Open {
            return Err(Error::UnitOfWork(
                "commit called before the unit of work was entered".to_string(),
            ));
        }

        let mut committed: Vec<String> = Vec::new();
        let mut failure: Option<(String, Error)> = None;
        for controller in &self.controllers {
            match controller.commit(&mut self.ctx).await {
                Ok(()) => committed.push(controller.backend_key().to_string()),
                Err(e) => {
                    failure = Some((controller.backend_key().to_string(), e));
                    break;
                }
            }
        }

        let close_result = self.close_all().await;

        if let Some((failed, source)) = failure {
            if committed.is_empty() {
                warn!(
                    subsystem = "uow",
                    component = "composite",
                    op = "commit",
                    backend = %failed,
                    error = %source,
                    "Commit failed before any backend committed"
                );
                return Err(source);
            }
            error!(
                subsystem = "uow",
                component = "composite",
                op = "commit",
                committed = ?committed,
                backend = %failed,
                error = %source,
                "Partial commit, stores need reconciliation"
            );
            return Err(Error::PartialCommit {
                committed,
                failed,
                source: Box::new(source),
            });
        }

        self.state = UowState::Committed;
        self.ctx.mark_committed();
        close_result
    }

    /// Roll back every backend in reverse order, then close all in reverse.
    ///
    /// Keeps going past a failing backend and returns the first error.
    /// No-op once committed or rolled back.
    pub async fn rollback(&mut self) -> Result<()> {
        if self.is_terminal() {
            debug!(
                subsystem = "uow",
                component = "composite",
                op = "rollback",
                state = ?self.state,
                "Rollback ignored, unit of work already finished"
            );
            return Ok(());
        }
        if self.state == UowState::Open {
            return Err(Error::UnitOfWork(
                "rollback called before the unit of work was entered".to_string(),
            ));
        }

        let mut first_error: Option<Error> = None;
        for controller in self.controllers.iter().rev() {
            if let Err(e) = controller.rollback(&mut self.ctx).await {
                warn!(
                    subsystem = "uow",
                    component = "composite",
                    op = "rollback",
                    backend = controller.backend_key(),
                    error = %e,
                    "Backend rollback failed"
                );
                first_error.get_or_insert(e);
            }
        }

        let close_result = self.close_all().await;

        self.state = UowState::RolledBack;
        self.ctx.mark_rolled_back();

        match first_error {
            Some(e) => Err(e),
            None => close_result,
        }
    }

    /// Close every controller in reverse order, returning the first error.
    async fn close_all(&mut self) -> Result<()> {
        let mut first_error: Option<Error> = None;
        for controller in self.controllers.iter().rev() {
            if let Err(e) = controller.close(&mut self.ctx).await {
                warn!(
                    subsystem = "uow",
                    component = "composite",
                    op = "close",
                    backend = controller.backend_key(),
                    error = %e,
                    "Backend close failed"
                );
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Delegate to the primary controller's flush; other backends are untouched.
    pub async fn flush(&mut self) -> Result<()> {
        let key = self.primary_flush_key;
        let controller = self
            .controllers
            .iter()
            .find(|c| c.backend_key() == key)
            .ok_or_else(|| Error::UnknownBackend(key.to_string()))?;

        if !controller.supports_flush() {
            debug!(
                subsystem = "uow",
                component = "composite",
                op = "flush",
                backend = key,
                "Primary backend does not flush"
            );
            return Ok(());
        }
        controller.flush(&mut self.ctx).await
    }

    /// Leave the scope of the operation.
    ///
    /// An `Err` result rolls back unless the unit of work already finished;
    /// a rollback failure is logged and the original error is returned. An
    /// `Ok` result without a prior commit does nothing to the backends.
    pub async fn exit<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() && self.state == UowState::Active {
            if let Err(rollback_err) = self.rollback().await {
                warn!(
                    subsystem = "uow",
                    component = "composite",
                    op = "exit",
                    error = %rollback_err,
                    "Rollback after failed operation also failed"
                );
            }
        } else if result.is_ok() && self.state == UowState::Active {
            debug!(
                subsystem = "uow",
                component = "composite",
                op = "exit",
                "Exited without commit"
            );
        }
        self.ctx.clear();
        result
    }

    /// Commit on success, then exit; the single explicit commit of an operation.
    pub async fn complete<T>(&mut self, result: Result<T>) -> Result<T> {
        let result = match result {
            Ok(value) => self.commit().await.map(|()| value),
            Err(e) => Err(e),
        };
        self.exit(result).await
    }
}

impl Drop for CompositeUnitOfWork {
    fn drop(&mut self) {
        if self.state == UowState::Active && !self.ctx.started_backends().is_empty() {
            warn!(
                subsystem = "uow",
                component = "composite",
                op = "drop",
                started = ?self.ctx.started_backends(),
                "Unit of work dropped while active, releasing backend handles"
            );
        }
    }
}

impl fmt::Debug for CompositeUnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.controllers.iter().map(|c| c.backend_key()).collect();
        f.debug_struct("CompositeUnitOfWork")
            .field("controllers", &keys)
            .field("primary_flush_key", &self.primary_flush_key)
            .field("state", &self.state)
            .field("ctx", &self.ctx)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{CallLog, RecordingController};

    fn uow_with(keys: &[&'static str]) -> (CompositeUnitOfWork, CallLog) {
        let log = CallLog::default();
        let controllers: Vec<Arc<dyn TransactionController>> = keys
            .iter()
            .map(|&k| Arc::new(RecordingController::new(k, log.clone())) as _)
            .collect();
        (CompositeUnitOfWork::new(controllers), log)
    }

    #[tokio::test]
    async fn test_commit_before_enter_is_error() {
        let (mut uow, log) = uow_with(&["sql"]);
        let err = uow.commit().await.unwrap_err();
        assert!(matches!(err, Error::UnitOfWork(_)));
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_enter_clears_context() {
        let (mut uow, _log) = uow_with(&["sql"]);
        uow.context_mut().set_handle("stale", 1_u8);
        uow.context_mut().mark_committed();
        uow.enter().await.unwrap();
        assert!(!uow.context().has_handle("stale"));
        assert!(!uow.context().is_committed());
        assert_eq!(uow.state(), UowState::Active);
    }

    #[tokio::test]
    async fn test_flush_unknown_primary_is_error() {
        let (uow, _log) = uow_with(&["graph"]);
        let mut uow = CompositeUnitOfWork::with_primary_flush(uow.controllers.clone(), "sql");
        uow.enter().await.unwrap();
        let err = uow.flush().await.unwrap_err();
        assert!(matches!(err, Error::UnknownBackend(ref k) if k == "sql"));
    }

    #[tokio::test]
    async fn test_exit_clears_context_after_commit() {
        let (mut uow, _log) = uow_with(&["sql"]);
        uow.enter().await.unwrap();
        uow.context_mut().set_handle("sql", 7_u32);
        let value = uow.complete(Ok(5)).await.unwrap();
        assert_eq!(value, 5);
        assert_eq!(uow.state(), UowState::Committed);
        assert!(!uow.context().has_handle("sql"));
    }

    #[tokio::test]
    async fn test_finished_unit_of_work_ignores_commit_and_rollback() {
        let (mut uow, log) = uow_with(&["sql", "graph"]);
        uow.enter().await.unwrap();
        uow.rollback().await.unwrap();
        let calls = log.calls().len();

        uow.commit().await.unwrap();
        uow.rollback().await.unwrap();
        assert_eq!(log.calls().len(), calls);
        assert_eq!(uow.state(), UowState::RolledBack);
        assert!(!uow.context().is_committed());
    }
}
