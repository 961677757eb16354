//! Note service: create, update, delete and merge notes across both stores.
//!
//! Every public operation opens one unit of work from the factory, runs the
//! `*_in` variant against it and commits once. The `*_in` variants compose,
//! so merging runs its update and deletes inside a single unit of work.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::keywords::{collect_cleanup_keyword_names, removed_keyword_names};
use crate::models::{CreateNote, Keyword, MergeNotes, Note, UpdateNote};
use crate::services::titles::{normalize_title, untitled_title};
use crate::sync::{resync_decision, NoteKeywordSync};
use crate::text::{
    append_with_newline, apply_patch, chain_with_newline, extract_link_intervals,
    extract_link_targets,
};
use crate::traits::{KeywordRepository, NoteGraphRepository, NoteRepository};
use crate::uow::{CompositeUnitOfWork, TxContext, UnitOfWorkFactory};

/// Orchestrates note writes so the relational rows, keyword rows and graph
/// projection change together.
#[derive(Clone)]
pub struct NoteService {
    notes: Arc<dyn NoteRepository>,
    graph: Arc<dyn NoteGraphRepository>,
    keywords: Arc<dyn KeywordRepository>,
    sync: NoteKeywordSync,
    uow_factory: UnitOfWorkFactory,
}

impl NoteService {
    pub fn new(
        notes: Arc<dyn NoteRepository>,
        graph: Arc<dyn NoteGraphRepository>,
        keywords: Arc<dyn KeywordRepository>,
        uow_factory: UnitOfWorkFactory,
    ) -> Self {
        let sync = NoteKeywordSync::new(keywords.clone(), graph.clone());
        Self {
            notes,
            graph,
            keywords,
            sync,
            uow_factory,
        }
    }

    // =========================================================================
    // PUBLIC OPERATIONS
    // =========================================================================

    /// Create a note and return its id.
    pub async fn create_note(&self, req: CreateNote) -> Result<Uuid> {
        let mut uow = (self.uow_factory)();
        if let Err(e) = uow.enter().await {
            return uow.exit(Err(e)).await;
        }
        let result = self.create_note_in(&mut uow, req).await;
        uow.complete(result).await
    }

    /// Apply a title, text or patch, and flag change to a note.
    pub async fn update_note(&self, req: UpdateNote) -> Result<Note> {
        let mut uow = (self.uow_factory)();
        if let Err(e) = uow.enter().await {
            return uow.exit(Err(e)).await;
        }
        let result = self.update_note_in(&mut uow, req).await;
        uow.complete(result).await
    }

    /// Delete a note and garbage-collect the keywords it held alive.
    pub async fn delete_note(&self, note_id: Uuid) -> Result<()> {
        let mut uow = (self.uow_factory)();
        if let Err(e) = uow.enter().await {
            return uow.exit(Err(e)).await;
        }
        let result = self.delete_note_in(&mut uow, note_id).await;
        uow.complete(result).await
    }

    /// Append the source notes' texts to the target and delete the sources.
    pub async fn merge_notes(&self, req: MergeNotes) -> Result<Note> {
        let mut uow = (self.uow_factory)();
        if let Err(e) = uow.enter().await {
            return uow.exit(Err(e)).await;
        }
        let result = self.merge_notes_in(&mut uow, req).await;
        uow.complete(result).await
    }

    /// Read a note without committing anything.
    pub async fn get_note(&self, note_id: Uuid) -> Result<Note> {
        let mut uow = (self.uow_factory)();
        if let Err(e) = uow.enter().await {
            return uow.exit(Err(e)).await;
        }
        let result = self
            .notes
            .get_by_id(uow.context_mut(), note_id)
            .await
            .and_then(|note| note.ok_or(Error::NoteNotFound(note_id)));
        uow.exit(result).await
    }

    /// Next free "Untitled N" title for a user.
    pub async fn new_note_title(&self, user_id: Uuid) -> Result<String> {
        let mut uow = (self.uow_factory)();
        if let Err(e) = uow.enter().await {
            return uow.exit(Err(e)).await;
        }
        let result = self.next_untitled_title(uow.context_mut(), user_id).await;
        uow.exit(result).await
    }

    // =========================================================================
    // UNIT-OF-WORK SCOPED OPERATIONS
    // =========================================================================

    pub async fn create_note_in(
        &self,
        uow: &mut CompositeUnitOfWork,
        req: CreateNote,
    ) -> Result<Uuid> {
        let start = Instant::now();
        let ctx = uow.context_mut();

        let title = match normalize_title(req.title.as_deref()) {
            Some(title) => {
                if self
                    .notes
                    .get_by_title(ctx, req.user_id, title, true)
                    .await?
                    .is_some()
                {
                    return Err(Error::TitleAlreadyExists(title.to_string()));
                }
                title.to_string()
            }
            None => self.next_untitled_title(ctx, req.user_id).await?,
        };

        let keyword = self.ensure_keyword_for_title(ctx, req.user_id, &title).await?;
        let mut note = Note::new(req.user_id, title, req.text);
        note.represents_keyword_id = Some(keyword.id);
        note.link_intervals = extract_link_intervals(note.text_or_empty());
        self.notes.create(ctx, &note).await?;

        // Surface deferred constraint violations before the graph is touched.
        uow.flush().await?;

        let ctx = uow.context_mut();
        self.graph.upsert_note(ctx, &note).await?;
        let outcome = self.sync.sync(ctx, &note).await?;

        info!(
            subsystem = "notes",
            component = "note_service",
            op = "create_note",
            note_id = %note.id,
            user_id = %note.user_id,
            edge_count = outcome.edges.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Note created"
        );
        Ok(note.id)
    }

    pub async fn update_note_in(
        &self,
        uow: &mut CompositeUnitOfWork,
        req: UpdateNote,
    ) -> Result<Note> {
        let start = Instant::now();
        let ctx = uow.context_mut();

        let mut note = self
            .notes
            .get_for_update(ctx, req.note_id)
            .await?
            .ok_or(Error::NoteNotFound(req.note_id))?;
        let previous = note.clone();

        let mut title_changed = false;
        if let Some(raw_title) = req.title.as_deref() {
            let title = normalize_title(Some(raw_title))
                .ok_or_else(|| Error::InvalidInput("Note title must not be blank".to_string()))?;
            if title != note.title {
                self.ensure_update_title(ctx, note.id, note.user_id, title)
                    .await?;
                let keyword = self.ensure_keyword_for_title(ctx, note.user_id, title).await?;
                note.title = title.to_string();
                note.represents_keyword_id = Some(keyword.id);
                title_changed = true;
            }
        }

        note.updated_at = Utc::now();

        let is_patch = req.has_patch();
        match req.patch.as_deref().filter(|p| !p.is_empty()) {
            Some(patch) => note.text = Some(apply_patch(previous.text_or_empty(), patch)?),
            None => {
                if let Some(text) = req.text {
                    note.text = text;
                }
            }
        }
        if let Some(pinned) = req.is_pinned {
            note.is_pinned = pinned;
        }
        if let Some(archived) = req.is_archived {
            note.is_archived = archived;
        }

        let decision = resync_decision(&previous, note.text_or_empty(), is_patch, title_changed);
        note.link_intervals = extract_link_intervals(note.text_or_empty());

        self.notes.update(ctx, &note).await?;
        self.graph.upsert_note(ctx, &note).await?;

        debug!(
            subsystem = "notes",
            component = "note_service",
            op = "update_note",
            note_id = %note.id,
            sync_decision = %decision,
            "Resync decision"
        );
        let edge_count = if decision.is_resync() {
            Some(self.sync.sync(ctx, &note).await?.edges.len())
        } else {
            None
        };

        let previous_names = collect_cleanup_keyword_names(
            &extract_link_targets(previous.text_or_empty()),
            previous.represents_keyword_id,
            &previous.title,
        );
        let current_names = collect_cleanup_keyword_names(
            &extract_link_targets(note.text_or_empty()),
            note.represents_keyword_id,
            &note.title,
        );
        let removed = removed_keyword_names(&previous_names, &current_names);
        let deleted = self.cleanup_keywords(ctx, note.user_id, &removed).await?;

        info!(
            subsystem = "notes",
            component = "note_service",
            op = "update_note",
            note_id = %note.id,
            resynced = decision.is_resync(),
            edge_count = ?edge_count,
            cleanup_count = deleted.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Note updated"
        );
        Ok(note)
    }

    pub async fn delete_note_in(
        &self,
        uow: &mut CompositeUnitOfWork,
        note_id: Uuid,
    ) -> Result<()> {
        let start = Instant::now();
        let ctx = uow.context_mut();

        let note = self
            .notes
            .get_for_update(ctx, note_id)
            .await?
            .ok_or(Error::NoteNotFound(note_id))?;

        let linked = self.keywords.get_note_keyword_names(ctx, note_id).await?;
        let names = collect_cleanup_keyword_names(&linked, note.represents_keyword_id, &note.title);

        // The note's own rows go first so a self-reference does not keep
        // its keyword alive.
        self.notes.delete(ctx, note_id).await?;
        self.keywords.delete_note_keywords(ctx, note_id).await?;
        let deleted = self.cleanup_keywords(ctx, note.user_id, &names).await?;
        self.graph.delete_note(ctx, note_id).await?;

        info!(
            subsystem = "notes",
            component = "note_service",
            op = "delete_note",
            note_id = %note_id,
            cleanup_count = deleted.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Note deleted"
        );
        Ok(())
    }

    pub async fn merge_notes_in(
        &self,
        uow: &mut CompositeUnitOfWork,
        req: MergeNotes,
    ) -> Result<Note> {
        validate_merge(&req)?;
        let ctx = uow.context_mut();

        let target = self.owned_note(ctx, req.user_id, req.target_note_id).await?;
        let mut sources = Vec::with_capacity(req.source_note_ids.len());
        for id in &req.source_note_ids {
            sources.push(self.owned_note(ctx, req.user_id, *id).await?);
        }

        // Empty sources leave the target untouched.
        let merged = match chain_with_newline(sources.iter().map(|n| n.text.as_deref())) {
            Some(appended) => {
                let mut update = UpdateNote::new(target.id);
                update.text = Some(append_with_newline(
                    target.text.as_deref(),
                    Some(appended.as_str()),
                ));
                self.update_note_in(uow, update).await?
            }
            None => target,
        };

        for source in &sources {
            self.delete_note_in(uow, source.id).await?;
        }

        info!(
            subsystem = "notes",
            component = "note_service",
            op = "merge_notes",
            note_id = %merged.id,
            source_count = sources.len(),
            "Notes merged"
        );
        Ok(merged)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn owned_note(&self, ctx: &mut TxContext, user_id: Uuid, note_id: Uuid) -> Result<Note> {
        let note = self
            .notes
            .get_by_id(ctx, note_id)
            .await?
            .ok_or(Error::NoteNotFound(note_id))?;
        if note.user_id != user_id {
            return Err(Error::Forbidden(format!(
                "Note {} belongs to another user",
                note_id
            )));
        }
        Ok(note)
    }

    /// Keyword every note represents: the one named after its title.
    async fn ensure_keyword_for_title(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        title: &str,
    ) -> Result<Keyword> {
        self.keywords
            .ensure_keywords(ctx, user_id, &[title.to_string()])
            .await?;
        self.keywords
            .get_by_user_and_name(ctx, user_id, title)
            .await?
            .ok_or_else(|| Error::Internal(format!("Keyword '{}' missing after ensure", title)))
    }

    /// Fail when another note of the user already has `title`.
    async fn ensure_update_title(
        &self,
        ctx: &mut TxContext,
        note_id: Uuid,
        user_id: Uuid,
        title: &str,
    ) -> Result<()> {
        match self.notes.get_by_title(ctx, user_id, title, true).await? {
            Some(other) if other.id != note_id => Err(Error::TitleAlreadyExists(title.to_string())),
            _ => Ok(()),
        }
    }

    /// First "Untitled N" no note of the user carries in the relational store.
    async fn next_untitled_title(&self, ctx: &mut TxContext, user_id: Uuid) -> Result<String> {
        let mut n = 1;
        loop {
            let candidate = untitled_title(n);
            if self
                .notes
                .get_by_title(ctx, user_id, &candidate, true)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Delete the named keywords nothing references any more, in both stores.
    async fn cleanup_keywords(
        &self,
        ctx: &mut TxContext,
        user_id: Uuid,
        names: &[String],
    ) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }
        let deleted = self
            .keywords
            .delete_unused_keywords(ctx, user_id, names)
            .await?;
        if !deleted.is_empty() {
            self.graph.delete_keywords(ctx, user_id, &deleted).await?;
        }
        debug!(
            subsystem = "notes",
            component = "note_service",
            op = "cleanup_keywords",
            user_id = %user_id,
            candidates = names.len(),
            cleanup_count = deleted.len(),
            "Keyword cleanup"
        );
        Ok(deleted)
    }
}

fn validate_merge(req: &MergeNotes) -> Result<()> {
    if req.source_note_ids.is_empty() {
        return Err(Error::InvalidInput(
            "At least one source note is required".to_string(),
        ));
    }
    let unique: HashSet<&Uuid> = req.source_note_ids.iter().collect();
    if unique.len() != req.source_note_ids.len() {
        return Err(Error::InvalidInput(
            "Source notes must not repeat".to_string(),
        ));
    }
    if unique.contains(&req.target_note_id) {
        return Err(Error::InvalidInput(
            "Target note cannot also be a source".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge(sources: Vec<Uuid>, target: Uuid) -> MergeNotes {
        MergeNotes {
            user_id: Uuid::nil(),
            source_note_ids: sources,
            target_note_id: target,
        }
    }

    #[test]
    fn test_validate_merge_rejects_empty_sources() {
        let err = validate_merge(&merge(vec![], Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_validate_merge_rejects_duplicates() {
        let a = Uuid::new_v4();
        let err = validate_merge(&merge(vec![a, a], Uuid::new_v4())).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_validate_merge_rejects_target_in_sources() {
        let a = Uuid::new_v4();
        let err = validate_merge(&merge(vec![a], a)).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_validate_merge_accepts_distinct() {
        assert!(validate_merge(&merge(vec![Uuid::new_v4()], Uuid::new_v4())).is_ok());
    }
}
