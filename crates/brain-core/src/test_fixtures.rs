//! In-memory fixtures for unit-of-work and note service tests.
//!
//! [`MemoryController`] keeps a committed state behind a mutex and hands each
//! unit of work a private copy through the [`TxContext`]. Commit publishes
//! the copy and rollback drops it, so tests observe the same atomicity the
//! database controllers give without a running database.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use brain_core::test_fixtures::InMemoryBackend;
//!
//! let backend = InMemoryBackend::new();
//! let service = backend.note_service();
//! let id = service.create_note(CreateNote { .. }).await?;
//! assert!(backend.committed_graph().notes.contains_key(&id));
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::defaults::{GRAPH_BACKEND, SQL_BACKEND};
use crate::error::{Error, Result};
use crate::models::{EdgeKind, GraphEdge, Keyword, Note};
use crate::services::NoteService;
use crate::traits::{KeywordRepository, NoteGraphRepository, NoteRepository};
use crate::uow::{CompositeUnitOfWork, TransactionController, TxContext, UnitOfWorkFactory};
use crate::uuid_utils::new_v7;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// CALL LOG
// =============================================================================

/// Shared, ordered record of controller calls such as `"commit:sql"`.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.0).push(entry.into());
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    /// Backends that received `op`, in call order.
    pub fn backends_for(&self, op: &str) -> Vec<String> {
        let prefix = format!("{}:", op);
        lock(&self.0)
            .iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }
}

// =============================================================================
// RECORDING CONTROLLER
// =============================================================================

/// Controller that records every call and fails on request.
#[derive(Debug, Clone)]
pub struct RecordingController {
    key: &'static str,
    log: CallLog,
    flushable: bool,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

impl RecordingController {
    pub fn new(key: &'static str, log: CallLog) -> Self {
        Self {
            key,
            log,
            flushable: false,
            fail_begin: false,
            fail_commit: false,
            fail_rollback: false,
        }
    }

    pub fn flushable(mut self) -> Self {
        self.flushable = true;
        self
    }

    pub fn failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    pub fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    pub fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    fn record(&self, op: &str) {
        self.log.record(format!("{}:{}", op, self.key));
    }
}

#[async_trait]
impl TransactionController for RecordingController {
    fn backend_key(&self) -> &'static str {
        self.key
    }

    async fn begin(&self, ctx: &mut TxContext) -> Result<()> {
        self.record("begin");
        if self.fail_begin {
            return Err(Error::Internal(format!("{} begin failed", self.key)));
        }
        ctx.set_handle(self.key, ());
        ctx.mark_started(self.key);
        Ok(())
    }

    async fn ensure_started(&self, ctx: &mut TxContext) -> Result<()> {
        self.record("ensure_started");
        if !ctx.is_started(self.key) {
            ctx.set_handle(self.key, ());
            ctx.mark_started(self.key);
        }
        Ok(())
    }

    async fn commit(&self, _ctx: &mut TxContext) -> Result<()> {
        self.record("commit");
        if self.fail_commit {
            return Err(Error::Internal(format!("{} commit failed", self.key)));
        }
        Ok(())
    }

    async fn rollback(&self, _ctx: &mut TxContext) -> Result<()> {
        self.record("rollback");
        if self.fail_rollback {
            return Err(Error::Internal(format!("{} rollback failed", self.key)));
        }
        Ok(())
    }

    async fn close(&self, ctx: &mut TxContext) -> Result<()> {
        self.record("close");
        ctx.remove_handle(self.key);
        Ok(())
    }

    fn supports_flush(&self) -> bool {
        self.flushable
    }

    async fn flush(&self, _ctx: &mut TxContext) -> Result<()> {
        self.record("flush");
        Ok(())
    }
}

// =============================================================================
// MEMORY CONTROLLER
// =============================================================================

/// Snapshot-isolated in-memory backend.
///
/// Eager controllers start on `begin` and accept `flush`, like the relational
/// controller; lazy ones start on first access, like the graph controller.
#[derive(Debug)]
pub struct MemoryController<S> {
    key: &'static str,
    store: Arc<Mutex<S>>,
    eager: bool,
    log: CallLog,
}

impl<S: Clone + Default + Send + 'static> MemoryController<S> {
    pub fn eager(key: &'static str, log: CallLog) -> Self {
        Self {
            key,
            store: Arc::new(Mutex::new(S::default())),
            eager: true,
            log,
        }
    }

    pub fn lazy(key: &'static str, log: CallLog) -> Self {
        Self {
            eager: false,
            ..Self::eager(key, log)
        }
    }

    /// Copy of the last committed state.
    pub fn committed(&self) -> S {
        lock(&self.store).clone()
    }

    /// Working copy for the current unit of work, started on demand.
    pub fn state<'c>(&self, ctx: &'c mut TxContext) -> Result<&'c mut S> {
        self.start(ctx);
        ctx.handle_mut::<S>(self.key)
            .ok_or_else(|| Error::MissingHandle(self.key.to_string()))
    }

    fn start(&self, ctx: &mut TxContext) {
        if ctx.is_started(self.key) {
            return;
        }
        self.log.record(format!("start:{}", self.key));
        let snapshot = lock(&self.store).clone();
        ctx.set_handle(self.key, snapshot);
        ctx.mark_started(self.key);
    }
}

#[async_trait]
impl<S: Clone + Default + Send + Sync + 'static> TransactionController for MemoryController<S> {
    fn backend_key(&self) -> &'static str {
        self.key
    }

    async fn begin(&self, ctx: &mut TxContext) -> Result<()> {
        self.log.record(format!("begin:{}", self.key));
        if self.eager {
            self.start(ctx);
        }
        Ok(())
    }

    async fn ensure_started(&self, ctx: &mut TxContext) -> Result<()> {
        self.start(ctx);
        Ok(())
    }

    async fn commit(&self, ctx: &mut TxContext) -> Result<()> {
        self.log.record(format!("commit:{}", self.key));
        if let Some(state) = ctx.take_handle::<S>(self.key) {
            *lock(&self.store) = state;
        }
        Ok(())
    }

    async fn rollback(&self, ctx: &mut TxContext) -> Result<()> {
        self.log.record(format!("rollback:{}", self.key));
        ctx.remove_handle(self.key);
        Ok(())
    }

    async fn close(&self, ctx: &mut TxContext) -> Result<()> {
        self.log.record(format!("close:{}", self.key));
        ctx.remove_handle(self.key);
        Ok(())
    }

    fn supports_flush(&self) -> bool {
        self.eager
    }

    async fn flush(&self, ctx: &mut TxContext) -> Result<()> {
        self.log.record(format!("flush:{}", self.key));
        self.start(ctx);
        Ok(())
    }
}

// =============================================================================
// RELATIONAL STATE
// =============================================================================

/// In-memory rows of the relational store.
#[derive(Debug, Clone, Default)]
pub struct RelationalState {
    pub notes: HashMap<Uuid, Note>,
    pub keywords: HashMap<Uuid, Keyword>,
    /// `(note_id, keyword_id)` link rows.
    pub note_keywords: HashSet<(Uuid, Uuid)>,
}

impl RelationalState {
    /// Sorted keyword names of a user.
    pub fn keyword_names(&self, user_id: Uuid) -> Vec<String> {
        let mut names: Vec<String> = self
            .keywords
            .values()
            .filter(|k| k.user_id == user_id)
            .map(|k| k.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn keyword_by_name(&self, user_id: Uuid, name: &str) -> Option<&Keyword> {
        self.keywords
            .values()
            .find(|k| k.user_id == user_id && k.name == name)
    }

    fn title_taken(&self, note: &Note) -> bool {
        self.notes
            .values()
            .any(|n| n.id != note.id && n.user_id == note.user_id && n.title == note.title)
    }
}

/// [`NoteRepository`] and [`KeywordRepository`] over a [`MemoryController`].
#[derive(Debug, Clone)]
pub struct MemoryRelational {
    sql: Arc<MemoryController<RelationalState>>,
}

impl MemoryRelational {
    pub fn new(sql: Arc<MemoryController<RelationalState>>) -> Self {
        Self { sql }
    }
}

#[async_trait]
impl NoteRepository for MemoryRelational {
    async fn get_by_id(&self, ctx: &mut TxContext, id: Uuid) -> Result<Option<Note>> {
        Ok(self.sql.state(ctx)?.notes.get(&id).cloned())
    }

    async fn get_for_update(&self, ctx: &mut TxContext, id: Uuid) -> Result<Option<Note>> {
        self.get_by_id(ctx, id).await
    }

    async fn create(&self, ctx: &mut TxContext, note: &Note) -> Result<()> {
        let state = self.sql.state(ctx)?;
        if state.notes.contains_key(&note.id) {
            return Err(Error::InvalidInput(format!("note {} already exists", note.id)));
        }
        if state.title_taken(note) {
            return Err(Error::TitleAlreadyExists(note.title.clone()));
        }
        state.notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn update(&self, ctx: &mut TxContext, note: &Note) -> Result<()> {
        let state = self.sql.state(ctx)?;
        if !state.notes.contains_key(&note.id) {
            return Err(Error::NoteNotFound(note.id));
        }
        if state.title_taken(note) {
            return Err(Error::TitleAlreadyExists(note.title.clone()));
        }
        state.notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn delete(&self, ctx: &mut TxContext, id: Uuid) -> Result<()> {
        let state = self.sql.state(ctx)?;
        state.notes.remove(&id);
        state.note_keywords.retain(|(note_id, _)| *note_id != id);
        Ok(())
    }

    async fn get_by_title(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        title: &str,
        exact_match: bool,
    ) -> Result<Option<Note>> {
        let state = self.sql.state(ctx)?;
        let mine = state.notes.values().filter(|n| n.user_id == user_id);
        let found = if exact_match {
            mine.filter(|n| n.title == title).max_by_key(|n| n.updated_at)
        } else {
            let needle = title.to_lowercase();
            mine.filter(|n| n.title.to_lowercase().contains(&needle))
                .max_by_key(|n| n.updated_at)
        };
        Ok(found.cloned())
    }
}

#[async_trait]
impl KeywordRepository for MemoryRelational {
    async fn ensure_keywords(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        names: &[String],
    ) -> Result<Vec<Keyword>> {
        let state = self.sql.state(ctx)?;
        let mut result: Vec<Keyword> = Vec::with_capacity(names.len());
        for name in names {
            if result.iter().any(|k| &k.name == name) {
                continue;
            }
            let keyword = match state.keyword_by_name(user_id, name) {
                Some(existing) => existing.clone(),
                None => {
                    let keyword = Keyword {
                        id: new_v7(),
                        user_id,
                        name: name.clone(),
                    };
                    state.keywords.insert(keyword.id, keyword.clone());
                    keyword
                }
            };
            result.push(keyword);
        }
        Ok(result)
    }

    async fn get_by_user_and_name(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<Keyword>> {
        Ok(self.sql.state(ctx)?.keyword_by_name(user_id, name).cloned())
    }

    async fn get_note_keyword_names(
        &self,
        ctx: &mut TxContext,
        note_id: Uuid,
    ) -> Result<Vec<String>> {
        let state = self.sql.state(ctx)?;
        let mut names: Vec<String> = state
            .note_keywords
            .iter()
            .filter(|(n, _)| *n == note_id)
            .filter_map(|(_, k)| state.keywords.get(k).map(|k| k.name.clone()))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn replace_note_keywords(
        &self,
        ctx: &mut TxContext,
        note_id: Uuid,
        keyword_ids: &[Uuid],
    ) -> Result<()> {
        let state = self.sql.state(ctx)?;
        state.note_keywords.retain(|(n, _)| *n != note_id);
        for keyword_id in keyword_ids {
            state.note_keywords.insert((note_id, *keyword_id));
        }
        Ok(())
    }

    async fn delete_note_keywords(&self, ctx: &mut TxContext, note_id: Uuid) -> Result<()> {
        self.sql
            .state(ctx)?
            .note_keywords
            .retain(|(n, _)| *n != note_id);
        Ok(())
    }

    async fn delete_unused_keywords(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        names: &[String],
    ) -> Result<Vec<String>> {
        let state = self.sql.state(ctx)?;
        let mut deleted = Vec::new();
        for name in names {
            let Some(keyword) = state.keyword_by_name(user_id, name).cloned() else {
                continue;
            };
            let linked = state.note_keywords.iter().any(|(_, k)| *k == keyword.id);
            let represented = state
                .notes
                .values()
                .any(|n| n.represents_keyword_id == Some(keyword.id));
            if linked || represented {
                continue;
            }
            state.keywords.remove(&keyword.id);
            deleted.push(keyword.name);
        }
        Ok(deleted)
    }
}

// =============================================================================
// GRAPH STATE
// =============================================================================

/// Note node of the in-memory graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNoteNode {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub is_pinned: bool,
    pub is_archived: bool,
}

/// In-memory graph projection.
#[derive(Debug, Clone, Default)]
pub struct GraphState {
    pub notes: HashMap<Uuid, GraphNoteNode>,
    pub keywords: HashMap<Uuid, Keyword>,
    pub edges: Vec<GraphEdge>,
}

impl GraphState {
    /// Sorted keyword node names of a user.
    pub fn keyword_names(&self, user_id: Uuid) -> Vec<String> {
        let mut names: Vec<String> = self
            .keywords
            .values()
            .filter(|k| k.user_id == user_id)
            .map(|k| k.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn edges_of(&self, note_id: Uuid) -> Vec<GraphEdge> {
        self.edges
            .iter()
            .filter(|e| e.note_id == note_id)
            .cloned()
            .collect()
    }

    fn upsert_keyword(&mut self, keyword: &Keyword) -> Uuid {
        if let Some(existing) = self
            .keywords
            .values()
            .find(|k| k.user_id == keyword.user_id && k.name == keyword.name)
        {
            return existing.id;
        }
        self.keywords.insert(keyword.id, keyword.clone());
        keyword.id
    }
}

/// [`NoteGraphRepository`] over a lazy [`MemoryController`].
#[derive(Debug, Clone)]
pub struct MemoryGraph {
    graph: Arc<MemoryController<GraphState>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryGraph {
    pub fn new(graph: Arc<MemoryController<GraphState>>) -> Self {
        Self {
            graph,
            fail_writes: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent graph write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("graph write failed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl NoteGraphRepository for MemoryGraph {
    async fn upsert_note(&self, ctx: &mut TxContext, note: &Note) -> Result<()> {
        self.check_writable()?;
        self.graph.state(ctx)?.notes.insert(
            note.id,
            GraphNoteNode {
                id: note.id,
                user_id: note.user_id,
                title: note.title.clone(),
                is_pinned: note.is_pinned,
                is_archived: note.is_archived,
            },
        );
        Ok(())
    }

    async fn delete_note(&self, ctx: &mut TxContext, id: Uuid) -> Result<()> {
        self.check_writable()?;
        let state = self.graph.state(ctx)?;
        state.notes.remove(&id);
        state.edges.retain(|e| e.note_id != id);
        Ok(())
    }

    async fn count_notes_by_user_and_title(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        title: &str,
    ) -> Result<i64> {
        let count = self
            .graph
            .state(ctx)?
            .notes
            .values()
            .filter(|n| n.user_id == user_id && n.title == title)
            .count();
        Ok(count as i64)
    }

    async fn sync_note_keywords(
        &self,
        ctx: &mut TxContext,
        note: &Note,
        linked: &[Keyword],
        represents: Option<&Keyword>,
    ) -> Result<Vec<GraphEdge>> {
        self.check_writable()?;
        let state = self.graph.state(ctx)?;
        state.edges.retain(|e| e.note_id != note.id);

        let wanted = linked
            .iter()
            .map(|k| (k, EdgeKind::LinksTo))
            .chain(represents.map(|k| (k, EdgeKind::Represents)));
        for (keyword, kind) in wanted {
            let keyword_id = state.upsert_keyword(keyword);
            state.edges.push(GraphEdge {
                note_id: note.id,
                keyword_id,
                keyword_name: keyword.name.clone(),
                kind,
            });
        }

        Ok(state.edges_of(note.id))
    }

    async fn get_note_edges(&self, ctx: &mut TxContext, note_id: Uuid) -> Result<Vec<GraphEdge>> {
        Ok(self.graph.state(ctx)?.edges_of(note_id))
    }

    async fn delete_keywords(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        names: &[String],
    ) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }
        self.check_writable()?;
        let state = self.graph.state(ctx)?;
        let doomed: HashSet<Uuid> = state
            .keywords
            .values()
            .filter(|k| k.user_id == user_id && names.contains(&k.name))
            .map(|k| k.id)
            .collect();
        state.keywords.retain(|id, _| !doomed.contains(id));
        state.edges.retain(|e| !doomed.contains(&e.keyword_id));
        Ok(())
    }
}

// =============================================================================
// BACKEND BUNDLE
// =============================================================================

/// Both in-memory stores, their controllers and repositories.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    pub log: CallLog,
    pub sql: Arc<MemoryController<RelationalState>>,
    pub graph: Arc<MemoryController<GraphState>>,
    pub relational_repo: Arc<MemoryRelational>,
    pub graph_repo: Arc<MemoryGraph>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let log = CallLog::default();
        let sql = Arc::new(MemoryController::eager(SQL_BACKEND, log.clone()));
        let graph = Arc::new(MemoryController::lazy(GRAPH_BACKEND, log.clone()));
        Self {
            relational_repo: Arc::new(MemoryRelational::new(sql.clone())),
            graph_repo: Arc::new(MemoryGraph::new(graph.clone())),
            log,
            sql,
            graph,
        }
    }

    /// Factory producing units of work over both stores, relational first.
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

    pub fn note_service(&self) -> NoteService {
        NoteService::new(
            self.relational_repo.clone(),
            self.graph_repo.clone(),
            self.relational_repo.clone(),
            self.uow_factory(),
        )
    }

    pub fn committed_relational(&self) -> RelationalState {
        self.sql.committed()
    }

    pub fn committed_graph(&self) -> GraphState {
        self.graph.committed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_controller_commit_publishes_state() {
        let backend = InMemoryBackend::new();
        let mut ctx = TxContext::new();
        backend.sql.begin(&mut ctx).await.unwrap();
        let user = Uuid::new_v4();
        let note = Note::new(user, "Alpha", None);
        backend.relational_repo.create(&mut ctx, &note).await.unwrap();
        assert!(backend.committed_relational().notes.is_empty());

        backend.sql.commit(&mut ctx).await.unwrap();
        assert!(backend.committed_relational().notes.contains_key(&note.id));
    }

    #[tokio::test]
    async fn test_memory_controller_rollback_discards_state() {
        let backend = InMemoryBackend::new();
        let mut ctx = TxContext::new();
        let note = Note::new(Uuid::new_v4(), "Alpha", None);
        backend.graph_repo.upsert_note(&mut ctx, &note).await.unwrap();
        assert!(ctx.is_started(GRAPH_BACKEND));

        backend.graph.rollback(&mut ctx).await.unwrap();
        backend.graph.close(&mut ctx).await.unwrap();
        assert!(backend.committed_graph().notes.is_empty());
    }

    #[tokio::test]
    async fn test_lazy_controller_begin_does_not_start() {
        let backend = InMemoryBackend::new();
        let mut ctx = TxContext::new();
        backend.graph.begin(&mut ctx).await.unwrap();
        assert!(!ctx.is_started(GRAPH_BACKEND));
        backend.sql.begin(&mut ctx).await.unwrap();
        assert!(ctx.is_started(SQL_BACKEND));
    }

    #[tokio::test]
    async fn test_delete_unused_keywords_keeps_referenced() {
        let backend = InMemoryBackend::new();
        let repo = backend.relational_repo.clone();
        let mut ctx = TxContext::new();
        let user = Uuid::new_v4();
        let names: Vec<String> = vec!["Linked".into(), "Represented".into(), "Orphan".into()];
        let keywords = repo.ensure_keywords(&mut ctx, user, &names).await.unwrap();

        let linker = Note::new(user, "Linker", None);
        repo.create(&mut ctx, &linker).await.unwrap();
        repo.replace_note_keywords(&mut ctx, linker.id, &[keywords[0].id])
            .await
            .unwrap();

        let mut owner = Note::new(user, "Represented", None);
        owner.represents_keyword_id = Some(keywords[1].id);
        repo.create(&mut ctx, &owner).await.unwrap();

        let deleted = repo
            .delete_unused_keywords(&mut ctx, user, &names)
            .await
            .unwrap();
        assert_eq!(deleted, vec!["Orphan".to_string()]);
        let state = backend.sql.state(&mut ctx).unwrap();
        assert_eq!(state.keyword_names(user), vec!["Linked", "Represented"]);
    }

    #[test]
    fn test_call_log_backends_for() {
        let log = CallLog::default();
        log.record("commit:sql");
        log.record("close:graph");
        log.record("commit:graph");
        assert_eq!(log.backends_for("commit"), vec!["sql", "graph"]);
    }
}
