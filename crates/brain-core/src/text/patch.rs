//! Textual patches in the diff-match-patch wire format.
//!
//! ```text
//! @@ -1,12 +1,20 @@
//!  Hello
//! +patched
//!  #world
//! ```
//!
//! Coordinates are one-based character offsets with the usual DMP rules for
//! empty and single-character ranges. Body lines are percent-encoded and
//! prefixed with `' '`, `'-'` or `'+'`.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::defaults::{PATCH_MARGIN, PATCH_MAX_PATTERN};
use crate::error::{Error, Result};
use crate::text::diff::{diff, Diff, DiffOp};

static HUNK_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^@@ -(\d+),?(\d*) \+(\d+),?(\d*) @@$").expect("hunk header pattern is valid")
});

/// One hunk: a run of diffs with surrounding context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub diffs: Vec<Diff>,
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
}

impl Patch {
    /// Text the hunk expects to find (EQUAL and DELETE segments).
    fn source_chars(&self) -> Vec<char> {
        self.diffs
            .iter()
            .filter(|d| d.op != DiffOp::Insert)
            .flat_map(|d| d.text.chars())
            .collect()
    }

    /// Text the hunk leaves behind (EQUAL and INSERT segments).
    fn target_chars(&self) -> Vec<char> {
        self.diffs
            .iter()
            .filter(|d| d.op != DiffOp::Delete)
            .flat_map(|d| d.text.chars())
            .collect()
    }
}

fn coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, length),
    }
}

fn encode_line(text: &str) -> String {
    urlencoding::encode(text).replace("%20", " ")
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{} +{} @@",
            coords(self.start1, self.length1),
            coords(self.start2, self.length2)
        )?;
        for d in &self.diffs {
            let sign = match d.op {
                DiffOp::Insert => '+',
                DiffOp::Delete => '-',
                DiffOp::Equal => ' ',
            };
            writeln!(f, "{}{}", sign, encode_line(&d.text))?;
        }
        Ok(())
    }
}

// =============================================================================
// CONSTRUCTION
// =============================================================================

/// Build the patches turning `old` into `new`.
pub fn make_patch(old: &str, new: &str) -> Vec<Patch> {
    let diffs = diff(old, new);
    patches_from_diffs(old, &diffs)
}

/// Split `diffs` (computed against `old`) into context-padded hunks.
pub fn patches_from_diffs(old: &str, diffs: &[Diff]) -> Vec<Patch> {
    let mut patches = Vec::new();
    if diffs.is_empty() {
        return patches;
    }

    let mut patch = Patch::default();
    let mut char_count1 = 0;
    let mut char_count2 = 0;
    // prepatch is the text with all previous hunks applied; postpatch also
    // includes the hunk being built.
    let mut prepatch: Vec<char> = old.chars().collect();
    let mut postpatch = prepatch.clone();
    let last = diffs.len() - 1;

    for (i, d) in diffs.iter().enumerate() {
        let len = d.char_len();

        if patch.diffs.is_empty() && d.op != DiffOp::Equal {
            patch.start1 = char_count1;
            patch.start2 = char_count2;
        }

        match d.op {
            DiffOp::Insert => {
                patch.diffs.push(d.clone());
                patch.length2 += len;
                postpatch.splice(char_count2..char_count2, d.text.chars());
            }
            DiffOp::Delete => {
                patch.diffs.push(d.clone());
                patch.length1 += len;
                postpatch.drain(char_count2..char_count2 + len);
            }
            DiffOp::Equal => {
                if len <= 2 * PATCH_MARGIN && !patch.diffs.is_empty() && i != last {
                    patch.diffs.push(d.clone());
                    patch.length1 += len;
                    patch.length2 += len;
                } else if len >= 2 * PATCH_MARGIN && !patch.diffs.is_empty() {
                    add_context(&mut patch, &prepatch);
                    patches.push(std::mem::take(&mut patch));
                    prepatch = postpatch.clone();
                    char_count1 = char_count2;
                }
            }
        }

        if d.op != DiffOp::Insert {
            char_count1 += len;
        }
        if d.op != DiffOp::Delete {
            char_count2 += len;
        }
    }

    if !patch.diffs.is_empty() {
        add_context(&mut patch, &prepatch);
        patches.push(patch);
    }

    patches
}

fn clamped(text: &[char], from: usize, to: usize) -> &[char] {
    let from = from.min(text.len());
    let to = to.min(text.len()).max(from);
    &text[from..to]
}

fn first_index(text: &[char], pattern: &[char]) -> Option<usize> {
    if pattern.is_empty() {
        return Some(0);
    }
    text.windows(pattern.len()).position(|w| w == pattern)
}

fn last_index(text: &[char], pattern: &[char]) -> Option<usize> {
    if pattern.is_empty() {
        return Some(text.len());
    }
    text.windows(pattern.len()).rposition(|w| w == pattern)
}

/// Grow the hunk's context until its pattern is unique in `text`, then pad
/// with one more margin on both sides.
fn add_context(patch: &mut Patch, text: &[char]) {
    if text.is_empty() {
        return;
    }

    let start = patch.start2;
    let end = patch.start2 + patch.length1;
    let mut pattern = clamped(text, start, end);
    let mut padding = 0;

    while first_index(text, pattern) != last_index(text, pattern)
        && pattern.len() < PATCH_MAX_PATTERN - 2 * PATCH_MARGIN
    {
        padding += PATCH_MARGIN;
        pattern = clamped(text, start.saturating_sub(padding), end + padding);
    }
    padding += PATCH_MARGIN;

    let prefix = clamped(text, start.saturating_sub(padding), start);
    let suffix = clamped(text, end, end + padding);

    if !prefix.is_empty() {
        patch
            .diffs
            .insert(0, Diff::new(DiffOp::Equal, prefix.iter().collect::<String>()));
    }
    if !suffix.is_empty() {
        patch
            .diffs
            .push(Diff::new(DiffOp::Equal, suffix.iter().collect::<String>()));
    }

    patch.start1 -= prefix.len();
    patch.start2 -= prefix.len();
    patch.length1 += prefix.len() + suffix.len();
    patch.length2 += prefix.len() + suffix.len();
}

// =============================================================================
// SERIALIZATION
// =============================================================================

/// Render patches in the textual wire format.
pub fn patch_to_text(patches: &[Patch]) -> String {
    patches.iter().map(|p| p.to_string()).collect()
}

fn parse_coords(start: &str, length: &str) -> Result<(usize, usize)> {
    let start: usize = start
        .parse()
        .map_err(|_| Error::PatchApply(format!("invalid hunk offset: {}", start)))?;
    match length {
        "" => Ok((start.saturating_sub(1), 1)),
        "0" => Ok((start, 0)),
        _ => {
            let length = length
                .parse()
                .map_err(|_| Error::PatchApply(format!("invalid hunk length: {}", length)))?;
            Ok((start.saturating_sub(1), length))
        }
    }
}

/// Parse the textual wire format.
///
/// Every syntax problem, including hunk lengths that disagree with the
/// hunk body, is reported as [`Error::PatchApply`].
pub fn patch_from_text(text: &str) -> Result<Vec<Patch>> {
    let mut patches = Vec::new();
    let lines: Vec<&str> = text.split('\n').collect();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.is_empty() {
            i += 1;
            continue;
        }

        let caps = HUNK_HEADER
            .captures(line)
            .ok_or_else(|| Error::PatchApply(format!("invalid patch header: {}", line)))?;
        let (start1, length1) = parse_coords(&caps[1], &caps[2])?;
        let (start2, length2) = parse_coords(&caps[3], &caps[4])?;
        let mut patch = Patch {
            diffs: Vec::new(),
            start1,
            start2,
            length1,
            length2,
        };
        i += 1;

        while i < lines.len() {
            let line = lines[i];
            let mut chars = line.chars();
            let Some(sign) = chars.next() else {
                i += 1;
                continue;
            };
            let op = match sign {
                ' ' => DiffOp::Equal,
                '-' => DiffOp::Delete,
                '+' => DiffOp::Insert,
                '@' => break,
                other => {
                    return Err(Error::PatchApply(format!(
                        "invalid patch mode '{}' in: {}",
                        other, line
                    )))
                }
            };
            let body = urlencoding::decode(chars.as_str())
                .map_err(|e| Error::PatchApply(format!("invalid encoding: {}", e)))?;
            patch.diffs.push(Diff::new(op, body.into_owned()));
            i += 1;
        }

        let source_len = patch.source_chars().len();
        let target_len = patch.target_chars().len();
        if source_len != patch.length1 || target_len != patch.length2 {
            return Err(Error::PatchApply(format!(
                "hunk {} lengths ({}, {}) do not match its body ({}, {})",
                patches.len() + 1,
                patch.length1,
                patch.length2,
                source_len,
                target_len
            )));
        }
        patches.push(patch);
    }

    Ok(patches)
}

// =============================================================================
// APPLICATION
// =============================================================================

/// Locate `pattern` in `text`: at `expected` if it matches there, otherwise
/// the nearest exact occurrence. Two equally near occurrences are ambiguous.
fn locate(text: &[char], pattern: &[char], expected: usize) -> Option<usize> {
    let expected = expected.min(text.len());
    if text[expected..].starts_with(pattern) {
        return Some(expected);
    }
    if pattern.is_empty() || pattern.len() > text.len() {
        return None;
    }

    let mut best: Option<(usize, usize)> = None;
    let mut ambiguous = false;
    for (pos, window) in text.windows(pattern.len()).enumerate() {
        if window != pattern {
            continue;
        }
        let distance = pos.abs_diff(expected);
        match best {
            Some((_, d)) if distance < d => {
                best = Some((pos, distance));
                ambiguous = false;
            }
            Some((_, d)) if distance == d => ambiguous = true,
            Some(_) => {}
            None => best = Some((pos, distance)),
        }
    }

    if ambiguous {
        return None;
    }
    best.map(|(pos, _)| pos)
}

/// Apply parsed patches to `base`.
///
/// Each hunk's expected text must be found exactly; fuzzy matching is not
/// attempted. A hunk that cannot be placed fails the whole application.
pub fn apply_patches(base: &str, patches: &[Patch]) -> Result<String> {
    let mut text: Vec<char> = base.chars().collect();
    let mut delta: isize = 0;

    for (index, patch) in patches.iter().enumerate() {
        let expected = (patch.start2 as isize + delta).max(0) as usize;
        let source = patch.source_chars();
        let start = locate(&text, &source, expected).ok_or_else(|| {
            Error::PatchApply(format!(
                "hunk {} does not match the current text",
                index + 1
            ))
        })?;
        delta = start as isize - patch.start2 as isize;
        text.splice(start..start + source.len(), patch.target_chars());
    }

    Ok(text.into_iter().collect())
}

/// Parse `patch_text` and apply it to `base`.
pub fn apply_patch(base: &str, patch_text: &str) -> Result<String> {
    let patches = patch_from_text(patch_text)?;
    apply_patches(base, &patches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_and_apply_patch() {
        let base = "Hello #world";
        let target = "Hello patched #world #ai";
        let text = patch_to_text(&make_patch(base, target));
        assert_eq!(apply_patch(base, &text).unwrap(), target);
    }

    #[test]
    fn test_patch_text_format() {
        let text = patch_to_text(&make_patch("abc", "abXc"));
        assert!(text.starts_with("@@ -1,3 +1,4 @@\n"));
        assert!(text.contains("\n+X\n"));
    }

    #[test]
    fn test_identical_texts_produce_no_patch() {
        assert!(make_patch("same", "same").is_empty());
        assert_eq!(apply_patch("same", "").unwrap(), "same");
    }

    #[test]
    fn test_patch_encodes_special_characters() {
        let base = "line one\nline two";
        let target = "line one\nline 100% [[two]]";
        let text = patch_to_text(&make_patch(base, target));
        assert!(!text.contains("[["));
        assert!(text.contains("%25"));
        assert_eq!(apply_patch(base, &text).unwrap(), target);
    }

    #[test]
    fn test_patch_multiple_hunks() {
        let base = "The first paragraph talks about [[Alpha]].\n\
                    Some filler text that separates the edits.\n\
                    The last paragraph talks about [[Beta]].";
        let target = "The first paragraph talks about [[Gamma]].\n\
                      Some filler text that separates the edits.\n\
                      The last paragraph mentions [[Beta]] too.";
        let patches = make_patch(base, target);
        assert!(patches.len() >= 2);
        let text = patch_to_text(&patches);
        assert_eq!(apply_patch(base, &text).unwrap(), target);
    }

    #[test]
    fn test_apply_with_shifted_base() {
        let base = "Hello #world";
        let text = patch_to_text(&make_patch(base, "Hello brave #world"));
        let drifted = "Preface. Hello #world";
        assert_eq!(apply_patch(drifted, &text).unwrap(), "Preface. Hello brave #world");
    }

    #[test]
    fn test_apply_mismatched_context_fails() {
        let text = patch_to_text(&make_patch("Hello #world", "Hello patched #world"));
        let err = apply_patch("Goodbye everyone", &text).unwrap_err();
        assert!(matches!(err, Error::PatchApply(_)));
    }

    #[test]
    fn test_invalid_patch_text_fails() {
        for bad in ["not a patch", "@@ -x +1 @@\n", "@@ -1,3 +1,3 @@\n*abc\n"] {
            let err = apply_patch("abc", bad).unwrap_err();
            assert!(matches!(err, Error::PatchApply(_)), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_inconsistent_hunk_lengths_fail() {
        let err = patch_from_text("@@ -1,5 +1,4 @@\n abc\n+X\n").unwrap_err();
        assert!(matches!(err, Error::PatchApply(_)));
    }

    #[test]
    fn test_parse_single_character_coords() {
        let patches = patch_from_text("@@ -1 +1 @@\n-a\n+b\n").unwrap();
        assert_eq!(patches[0].start1, 0);
        assert_eq!(patches[0].length1, 1);
        assert_eq!(apply_patches("a", &patches).unwrap(), "b");
    }

    #[test]
    fn test_parse_empty_range_coords() {
        let patches = patch_from_text("@@ -0,0 +1,3 @@\n+abc\n").unwrap();
        assert_eq!(patches[0].start1, 0);
        assert_eq!(patches[0].length1, 0);
        assert_eq!(apply_patches("", &patches).unwrap(), "abc");
    }

    #[test]
    fn test_ambiguous_relocation_fails() {
        // Hunk claims offset 4 but expects "ab", which occurs at 2 and 6.
        let patches = patch_from_text("@@ -5,2 +5,2 @@\n-ab\n+cd\n").unwrap();
        let err = apply_patches("xxabxxabxx", &patches).unwrap_err();
        assert!(matches!(err, Error::PatchApply(_)));
    }

    #[test]
    fn test_multibyte_patch() {
        let base = "Заметка о [[Альфа]]";
        let target = "Заметка о [[Бета]] и [[Альфа]]";
        let text = patch_to_text(&make_patch(base, target));
        assert_eq!(apply_patch(base, &text).unwrap(), target);
    }
}
