//! Domain models: notes, keywords, link intervals, graph edges and request DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::uuid_utils::new_v7;

// =============================================================================
// NOTES
// =============================================================================

/// Half-open `[start, end)` range of character offsets marking a wikilink
/// span in one specific text revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkInterval {
    pub start: usize,
    pub end: usize,
}

impl LinkInterval {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A durable note row (system of record).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Unique per user, compared case-sensitively.
    pub title: String,
    pub text: Option<String>,
    /// Keyword named after this note's title, so other notes can link to it.
    pub represents_keyword_id: Option<Uuid>,
    pub is_pinned: bool,
    pub is_archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Wikilink spans as of the last synchronization; a snapshot, not a live index.
    #[serde(default)]
    pub link_intervals: Vec<LinkInterval>,
}

impl Note {
    /// Build a new, unpinned, unarchived note with a fresh id.
    pub fn new(user_id: Uuid, title: impl Into<String>, text: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            user_id,
            title: title.into(),
            text,
            represents_keyword_id: None,
            is_pinned: false,
            is_archived: false,
            created_at: now,
            updated_at: now,
            link_intervals: Vec::new(),
        }
    }

    /// The note text, with a missing text read as empty.
    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

// =============================================================================
// KEYWORDS
// =============================================================================

/// Graph node for a title that is linked to or represented by some note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
}

// =============================================================================
// GRAPH PROJECTION
// =============================================================================

/// Kind of edge between a note node and a keyword node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// The note text contains `[[keyword]]`.
    LinksTo,
    /// The note title is the keyword.
    Represents,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::LinksTo => "links_to",
            EdgeKind::Represents => "represents",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "links_to" => Some(EdgeKind::LinksTo),
            "represents" => Some(EdgeKind::Represents),
            _ => None,
        }
    }
}

/// Edge in the graph projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub note_id: Uuid,
    pub keyword_id: Uuid,
    pub keyword_name: String,
    pub kind: EdgeKind,
}

// =============================================================================
// REQUESTS
// =============================================================================

/// Request for creating a note.
#[derive(Debug, Clone, Default)]
pub struct CreateNote {
    pub user_id: Uuid,
    /// `None` or blank picks the next free "Untitled N".
    pub title: Option<String>,
    pub text: Option<String>,
}

/// Request for updating a note. Outer `None` means "not supplied".
#[derive(Debug, Clone, Default)]
pub struct UpdateNote {
    pub note_id: Uuid,
    pub title: Option<String>,
    /// Full replacement; `Some(None)` clears the text.
    pub text: Option<Option<String>>,
    /// Patch text against the current revision; takes precedence over `text`.
    pub patch: Option<String>,
    pub is_pinned: Option<bool>,
    pub is_archived: Option<bool>,
}

impl UpdateNote {
    pub fn new(note_id: Uuid) -> Self {
        Self {
            note_id,
            ..Default::default()
        }
    }

    /// A non-empty patch was supplied.
    pub fn has_patch(&self) -> bool {
        self.patch.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// Request for merging source notes into a target note.
#[derive(Debug, Clone)]
pub struct MergeNotes {
    pub user_id: Uuid,
    pub source_note_ids: Vec<Uuid>,
    pub target_note_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_interval_len() {
        let interval = LinkInterval::new(6, 15);
        assert_eq!(interval.len(), 9);
        assert!(!interval.is_empty());
        assert!(LinkInterval::new(4, 4).is_empty());
    }

    #[test]
    fn test_note_new_defaults() {
        let user = Uuid::new_v4();
        let note = Note::new(user, "Roadmap", None);
        assert_eq!(note.user_id, user);
        assert!(crate::uuid_utils::is_v7(&note.id));
        assert_eq!(note.text_or_empty(), "");
        assert!(note.link_intervals.is_empty());
        assert!(!note.is_pinned);
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn test_note_deserializes_without_intervals() {
        let json = serde_json::json!({
            "id": Uuid::nil(),
            "user_id": Uuid::nil(),
            "title": "Alpha",
            "text": null,
            "represents_keyword_id": null,
            "is_pinned": false,
            "is_archived": false,
            "created_at": "2026-01-01T00:00:00Z",
            "updated_at": "2026-01-01T00:00:00Z"
        });
        let note: Note = serde_json::from_value(json).unwrap();
        assert!(note.link_intervals.is_empty());
    }

    #[test]
    fn test_edge_kind_round_trip() {
        for kind in [EdgeKind::LinksTo, EdgeKind::Represents] {
            assert_eq!(EdgeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EdgeKind::parse("mentions"), None);
    }

    #[test]
    fn test_update_note_has_patch() {
        let mut req = UpdateNote::new(Uuid::nil());
        assert!(!req.has_patch());
        req.patch = Some(String::new());
        assert!(!req.has_patch());
        req.patch = Some("@@ -1,1 +1,1 @@\n".to_string());
        assert!(req.has_patch());
    }
}
