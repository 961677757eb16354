//! Note to keyword graph synchronization.
//!
//! A full resync re-derives the keywords a note links to and represents and
//! rewrites its graph edges. Patches that provably leave every recorded
//! wikilink span alone skip it.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::models::{GraphEdge, Keyword, Note};
use crate::text::{diff, extract_link_targets, inserts_brackets, ranges_touched};
use crate::traits::{KeywordRepository, NoteGraphRepository};
use crate::uow::TxContext;

/// Why a resync is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncReason {
    /// Text replaced wholesale or set without a patch.
    FullReplace,
    TitleChanged,
    /// Patch on a note with no recorded link spans.
    NoRecordedIntervals,
    /// Patch edits inside or at the edge of a recorded link span.
    LinkRangeTouched,
    /// Patch inserts `[` or `]`, which may form a new link.
    BracketInserted,
}

impl ResyncReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResyncReason::FullReplace => "full_replace",
            ResyncReason::TitleChanged => "title_changed",
            ResyncReason::NoRecordedIntervals => "no_recorded_intervals",
            ResyncReason::LinkRangeTouched => "link_range_touched",
            ResyncReason::BracketInserted => "bracket_inserted",
        }
    }
}

/// Outcome of the resync decision for one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    Resync(ResyncReason),
    Skip,
}

impl SyncDecision {
    pub fn is_resync(&self) -> bool {
        matches!(self, SyncDecision::Resync(_))
    }
}

impl fmt::Display for SyncDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDecision::Resync(reason) => write!(f, "resync({})", reason.as_str()),
            SyncDecision::Skip => write!(f, "skip"),
        }
    }
}

/// Decide whether an update needs a full keyword resync.
///
/// `previous` is the note as loaded, before any mutation; its
/// `link_intervals` index into its text.
pub fn resync_decision(
    previous: &Note,
    new_text: &str,
    is_patch: bool,
    title_changed: bool,
) -> SyncDecision {
    if !is_patch {
        return SyncDecision::Resync(ResyncReason::FullReplace);
    }
    if title_changed {
        return SyncDecision::Resync(ResyncReason::TitleChanged);
    }
    if previous.link_intervals.is_empty() {
        return SyncDecision::Resync(ResyncReason::NoRecordedIntervals);
    }

    let old_text = previous.text_or_empty();
    let diffs = diff(old_text, new_text);
    if ranges_touched(old_text.chars().count(), &diffs, &previous.link_intervals) {
        return SyncDecision::Resync(ResyncReason::LinkRangeTouched);
    }
    if inserts_brackets(&diffs) {
        return SyncDecision::Resync(ResyncReason::BracketInserted);
    }
    SyncDecision::Skip
}

/// Edges written by a resync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub edges: Vec<GraphEdge>,
}

/// Rewrites a note's keyword links in both stores.
#[derive(Clone)]
pub struct NoteKeywordSync {
    keywords: Arc<dyn KeywordRepository>,
    graph: Arc<dyn NoteGraphRepository>,
}

impl NoteKeywordSync {
    pub fn new(keywords: Arc<dyn KeywordRepository>, graph: Arc<dyn NoteGraphRepository>) -> Self {
        Self { keywords, graph }
    }

    /// Re-derive the note's linked and represented keywords from its current
    /// text and title, and replace its relational links and graph edges.
    pub async fn sync(&self, ctx: &mut TxContext, note: &Note) -> Result<SyncOutcome> {
        let targets = extract_link_targets(note.text_or_empty());
        let linked = self
            .keywords
            .ensure_keywords(ctx, note.user_id, &targets)
            .await?;
        let keyword_ids: Vec<_> = linked.iter().map(|k| k.id).collect();
        self.keywords
            .replace_note_keywords(ctx, note.id, &keyword_ids)
            .await?;

        let represents: Option<Keyword> = match note.represents_keyword_id {
            Some(_) => {
                self.keywords
                    .get_by_user_and_name(ctx, note.user_id, &note.title)
                    .await?
            }
            None => None,
        };

        let edges = self
            .graph
            .sync_note_keywords(ctx, note, &linked, represents.as_ref())
            .await?;

        debug!(
            subsystem = "sync",
            component = "keyword_sync",
            op = "sync",
            note_id = %note.id,
            linked = linked.len(),
            edge_count = edges.len(),
            "Resynced note keywords"
        );

        Ok(SyncOutcome { edges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::extract_link_intervals;
    use uuid::Uuid;

    fn note_with_text(text: &str) -> Note {
        let mut note = Note::new(Uuid::new_v4(), "Roadmap", Some(text.to_string()));
        note.link_intervals = extract_link_intervals(text);
        note
    }

    #[test]
    fn test_alpha_interval_fixture() {
        let note = note_with_text("Plan: [[Alpha]] for the next quarter");
        assert_eq!(note.link_intervals[0].start, 6);
        assert_eq!(note.link_intervals[0].end, 15);
    }

    #[test]
    fn test_full_replace_always_resyncs() {
        let note = note_with_text("Plan: [[Alpha]] for the next quarter");
        assert_eq!(
            resync_decision(&note, note.text_or_empty(), false, false),
            SyncDecision::Resync(ResyncReason::FullReplace)
        );
    }

    #[test]
    fn test_title_change_resyncs() {
        let note = note_with_text("Plan: [[Alpha]] for the next quarter");
        let new_text = "Plan: [[Alpha]] for the next year";
        assert_eq!(
            resync_decision(&note, new_text, true, true),
            SyncDecision::Resync(ResyncReason::TitleChanged)
        );
    }

    #[test]
    fn test_patch_without_intervals_resyncs() {
        let note = note_with_text("No links here");
        assert_eq!(
            resync_decision(&note, "No links here yet", true, false),
            SyncDecision::Resync(ResyncReason::NoRecordedIntervals)
        );
    }

    #[test]
    fn test_patch_outside_links_skips() {
        let note = note_with_text("Plan: [[Alpha]] for the next quarter");
        let new_text = "Plan: [[Alpha]] for the next fiscal quarter";
        assert_eq!(resync_decision(&note, new_text, true, false), SyncDecision::Skip);
    }

    #[test]
    fn test_patch_deleting_inside_link_resyncs() {
        let note = note_with_text("Plan: [[Alpha]] for the next quarter");
        // Drop the character at offset 10 ('p').
        let mut chars: Vec<char> = note.text_or_empty().chars().collect();
        chars.remove(10);
        let new_text: String = chars.into_iter().collect();
        assert_eq!(
            resync_decision(&note, &new_text, true, false),
            SyncDecision::Resync(ResyncReason::LinkRangeTouched)
        );
    }

    #[test]
    fn test_patch_inserting_brackets_resyncs() {
        let note = note_with_text("Plan: [[Alpha]] for the next quarter");
        let new_text = "Plan: [[Alpha]] for the next [[Quarter]]";
        assert!(resync_decision(&note, new_text, true, false).is_resync());
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(SyncDecision::Skip.to_string(), "skip");
        assert_eq!(
            SyncDecision::Resync(ResyncReason::TitleChanged).to_string(),
            "resync(title_changed)"
        );
    }
}
