//! Character-level diffs between two text revisions.

use similar::{ChangeTag, TextDiff};

use crate::models::LinkInterval;

/// Kind of a diff segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
}

/// One segment of a diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    pub op: DiffOp,
    pub text: String,
}

impl Diff {
    pub fn new(op: DiffOp, text: impl Into<String>) -> Self {
        Self {
            op,
            text: text.into(),
        }
    }

    /// Length in characters, the unit of every offset in this module.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Compute the diff turning `old` into `new`.
///
/// Uses Myers' algorithm over characters; adjacent segments with the same
/// operation are merged.
pub fn diff(old: &str, new: &str) -> Vec<Diff> {
    let text_diff = TextDiff::from_chars(old, new);
    let mut diffs: Vec<Diff> = Vec::new();

    for change in text_diff.iter_all_changes() {
        let op = match change.tag() {
            ChangeTag::Equal => DiffOp::Equal,
            ChangeTag::Insert => DiffOp::Insert,
            ChangeTag::Delete => DiffOp::Delete,
        };
        match diffs.last_mut() {
            Some(last) if last.op == op => last.text.push_str(change.value()),
            _ => diffs.push(Diff::new(op, change.value())),
        }
    }

    diffs
}

/// Rebuild the old revision (EQUAL and DELETE segments).
pub fn source_text(diffs: &[Diff]) -> String {
    diffs
        .iter()
        .filter(|d| d.op != DiffOp::Insert)
        .map(|d| d.text.as_str())
        .collect()
}

/// Rebuild the new revision (EQUAL and INSERT segments).
pub fn target_text(diffs: &[Diff]) -> String {
    diffs
        .iter()
        .filter(|d| d.op != DiffOp::Delete)
        .map(|d| d.text.as_str())
        .collect()
}

/// Whether any INSERT segment adds a `[` or `]`.
pub fn inserts_brackets(diffs: &[Diff]) -> bool {
    diffs
        .iter()
        .any(|d| d.op == DiffOp::Insert && d.text.contains(['[', ']']))
}

/// Decide whether an edit may have invalidated a protected range.
///
/// `protected` ranges are offsets into the old revision, clamped to
/// `old_len`. A DELETE touches a range it overlaps; an INSERT touches a range
/// it lands inside of or on either boundary of.
pub fn ranges_touched(old_len: usize, diffs: &[Diff], protected: &[LinkInterval]) -> bool {
    let ranges: Vec<(usize, usize)> = protected
        .iter()
        .map(|r| (r.start.min(old_len), r.end.min(old_len)))
        .filter(|(start, end)| start < end)
        .collect();
    if ranges.is_empty() {
        return false;
    }

    let mut pos = 0;
    for d in diffs {
        let len = d.char_len();
        match d.op {
            DiffOp::Equal => pos += len,
            DiffOp::Delete => {
                let end = pos + len;
                if ranges.iter().any(|&(s, e)| pos < e && s < end) {
                    return true;
                }
                pos = end;
            }
            DiffOp::Insert => {
                if ranges.iter().any(|&(s, e)| s <= pos && pos <= e) {
                    return true;
                }
            }
        }
    }

    false
}
