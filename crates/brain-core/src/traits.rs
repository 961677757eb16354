//! Repository traits consumed by the note services.
//!
//! Every method takes the operation's [`TxContext`]; implementations backed
//! by a transactional store fetch (and lazily start) their transaction from
//! it, so all writes of one operation land in the same unit of work.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{GraphEdge, Keyword, Note};
use crate::uow::TxContext;

// =============================================================================
// NOTE REPOSITORY
// =============================================================================

/// Relational note storage (system of record).
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Fetch a note by id.
    async fn get_by_id(&self, ctx: &mut TxContext, id: Uuid) -> Result<Option<Note>>;

    /// Fetch a note by id and lock its row until the operation ends.
    ///
    /// Concurrent updates of the same note serialize on this lock.
    async fn get_for_update(&self, ctx: &mut TxContext, id: Uuid) -> Result<Option<Note>>;

    /// Insert a new note row.
    async fn create(&self, ctx: &mut TxContext, note: &Note) -> Result<()>;

    /// Overwrite an existing note row.
    async fn update(&self, ctx: &mut TxContext, note: &Note) -> Result<()>;

    /// Delete a note row.
    async fn delete(&self, ctx: &mut TxContext, id: Uuid) -> Result<()>;

    /// Find a note of `user_id` by title.
    ///
    /// With `exact_match` the title is compared case-sensitively; otherwise a
    /// case-insensitive substring match returns the most recently updated hit.
    async fn get_by_title(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        title: &str,
        exact_match: bool,
    ) -> Result<Option<Note>>;
}

// =============================================================================
// GRAPH REPOSITORY
// =============================================================================

/// Graph projection of notes, keywords and their edges.
#[async_trait]
pub trait NoteGraphRepository: Send + Sync {
    /// Create or refresh the note node (title, pinned and archived state).
    async fn upsert_note(&self, ctx: &mut TxContext, note: &Note) -> Result<()>;

    /// Remove the note node and its edges.
    async fn delete_note(&self, ctx: &mut TxContext, id: Uuid) -> Result<()>;

    /// Count note nodes of a user with exactly this title.
    async fn count_notes_by_user_and_title(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        title: &str,
    ) -> Result<i64>;

    /// Replace the note's keyword edges: `links_to` for every linked keyword,
    /// `represents` for the keyword named by its title. Returns the new edges.
    async fn sync_note_keywords(
        &self,
        ctx: &mut TxContext,
        note: &Note,
        linked: &[Keyword],
        represents: Option<&Keyword>,
    ) -> Result<Vec<GraphEdge>>;

    /// Current edges of a note node.
    async fn get_note_edges(&self, ctx: &mut TxContext, note_id: Uuid) -> Result<Vec<GraphEdge>>;

    /// Remove keyword nodes (and their edges) by name.
    async fn delete_keywords(&self, ctx: &mut TxContext, user_id: Uuid, names: &[String])
        -> Result<()>;
}

// =============================================================================
// KEYWORD REPOSITORY
// =============================================================================

/// Relational keyword storage and note-keyword links.
#[async_trait]
pub trait KeywordRepository: Send + Sync {
    /// Create missing keywords and return all requested ones.
    async fn ensure_keywords(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        names: &[String],
    ) -> Result<Vec<Keyword>>;

    async fn get_by_user_and_name(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        name: &str,
    ) -> Result<Option<Keyword>>;

    /// Names of keywords the note links to, sorted.
    async fn get_note_keyword_names(&self, ctx: &mut TxContext, note_id: Uuid)
        -> Result<Vec<String>>;

    /// Make `keyword_ids` the exact set of keywords the note links to.
    async fn replace_note_keywords(
        &self,
        ctx: &mut TxContext,
        note_id: Uuid,
        keyword_ids: &[Uuid],
    ) -> Result<()>;

    async fn delete_note_keywords(&self, ctx: &mut TxContext, note_id: Uuid) -> Result<()>;

    /// Delete the named keywords that no note links to or represents.
    ///
    /// The referrer check runs at deletion time, not against a snapshot taken
    /// earlier. Returns the names actually deleted.
    async fn delete_unused_keywords(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        names: &[String],
    ) -> Result<Vec<String>>;
}
