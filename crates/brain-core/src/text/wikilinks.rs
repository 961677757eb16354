//! `[[wikilink]]` extraction.
//!
//! A link is `[[target]]` or `[[target|label]]`; the label is display-only
//! and dropped. Targets are trimmed, and an empty target is not a link.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::LinkInterval;

static WIKILINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[\[([^\[\]]+?)\]\]").expect("wikilink pattern is valid"));

fn link_target(inner: &str) -> Option<&str> {
    let target = inner.split('|').next()?.trim();
    (!target.is_empty()).then_some(target)
}

/// Spans of every link in `text`, as character offsets covering the
/// brackets, in order of appearance.
pub fn extract_link_intervals(text: &str) -> Vec<LinkInterval> {
    let mut intervals = Vec::new();
    // Running byte -> char offset conversion; matches arrive in order.
    let mut byte_pos = 0;
    let mut char_pos = 0;

    for cap in WIKILINK.captures_iter(text) {
        let (Some(whole), Some(inner)) = (cap.get(0), cap.get(1)) else {
            continue;
        };
        if link_target(inner.as_str()).is_none() {
            continue;
        }
        char_pos += text[byte_pos..whole.start()].chars().count();
        let start = char_pos;
        char_pos += whole.as_str().chars().count();
        byte_pos = whole.end();
        intervals.push(LinkInterval::new(start, char_pos));
    }

    intervals
}

/// Distinct link targets in `text`, in order of first appearance.
pub fn extract_link_targets(text: &str) -> Vec<String> {
    let mut targets: Vec<String> = Vec::new();
    for cap in WIKILINK.captures_iter(text) {
        let Some(target) = cap.get(1).and_then(|m| link_target(m.as_str())) else {
            continue;
        };
        if !targets.iter().any(|t| t == target) {
            targets.push(target.to_string());
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_targets_in_order() {
        let text = "See [[Beta]] and [[Alpha]], then [[Beta]] again.";
        assert_eq!(extract_link_targets(text), vec!["Beta", "Alpha"]);
    }

    #[test]
    fn test_extract_targets_drops_label_and_trims() {
        let text = "[[ Roadmap | the plan ]] and [[Infra|infrastructure]]";
        assert_eq!(extract_link_targets(text), vec!["Roadmap", "Infra"]);
    }

    #[test]
    fn test_extract_targets_skips_empty() {
        assert!(extract_link_targets("[[ ]] [[|label]] [[]]").is_empty());
    }

    #[test]
    fn test_extract_targets_case_sensitive() {
        assert_eq!(extract_link_targets("[[alpha]] [[Alpha]]"), vec!["alpha", "Alpha"]);
    }

    #[test]
    fn test_unclosed_link_is_ignored() {
        assert!(extract_link_targets("[[Alpha] and [Beta]]").is_empty());
        assert!(extract_link_intervals("[[Alpha").is_empty());
    }

    #[test]
    fn test_intervals_cover_brackets() {
        let text = "Plan: [[Infra]] now";
        let intervals = extract_link_intervals(text);
        assert_eq!(intervals, vec![LinkInterval::new(6, 15)]);
        let span: String = text.chars().skip(6).take(9).collect();
        assert_eq!(span, "[[Infra]]");
    }

    #[test]
    fn test_intervals_use_character_offsets() {
        let text = "Ünïcödé [[Ålpha]] и [[Beta]]";
        let intervals = extract_link_intervals(text);
        assert_eq!(intervals.len(), 2);
        let chars: Vec<char> = text.chars().collect();
        let first: String = chars[intervals[0].start..intervals[0].end].iter().collect();
        let second: String = chars[intervals[1].start..intervals[1].end].iter().collect();
        assert_eq!(first, "[[Ålpha]]");
        assert_eq!(second, "[[Beta]]");
    }

    #[test]
    fn test_intervals_include_duplicates() {
        let intervals = extract_link_intervals("[[A]][[A]]");
        assert_eq!(
            intervals,
            vec![LinkInterval::new(0, 5), LinkInterval::new(5, 10)]
        );
    }
}
