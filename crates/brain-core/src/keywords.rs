//! Keyword reference rules.
//!
//! A keyword is referenced by a note when the note links to it or when the
//! note's title represents it. Keywords with no remaining referrer are
//! garbage, and the repository re-checks that at deletion time.

use uuid::Uuid;

/// Every keyword name a note state references.
///
/// `targets` are the note's wikilink targets. The title counts only while the
/// note represents a keyword.
pub fn collect_cleanup_keyword_names(
    targets: &[String],
    represents_keyword_id: Option<Uuid>,
    title: &str,
) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(targets.len() + 1);
    for target in targets {
        if !names.contains(target) {
            names.push(target.clone());
        }
    }
    if represents_keyword_id.is_some() && !names.iter().any(|n| n == title) {
        names.push(title.to_string());
    }
    names
}

/// Names referenced by the previous state that the current state no longer references.
pub fn removed_keyword_names(previous: &[String], current: &[String]) -> Vec<String> {
    previous
        .iter()
        .filter(|name| !current.contains(name))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_collect_includes_represented_title() {
        let collected =
            collect_cleanup_keyword_names(&names(&["Infra"]), Some(Uuid::nil()), "Roadmap");
        assert_eq!(collected, names(&["Infra", "Roadmap"]));
    }

    #[test]
    fn test_collect_without_represented_keyword() {
        let collected = collect_cleanup_keyword_names(&names(&["Infra"]), None, "Roadmap");
        assert_eq!(collected, names(&["Infra"]));
    }

    #[test]
    fn test_collect_self_reference_listed_once() {
        let collected =
            collect_cleanup_keyword_names(&names(&["Alpha", "Alpha"]), Some(Uuid::nil()), "Alpha");
        assert_eq!(collected, names(&["Alpha"]));
    }

    #[test]
    fn test_removed_keyword_names() {
        let previous = names(&["Infra", "Roadmap", "Ops"]);
        let current = names(&["Roadmap", "Design"]);
        assert_eq!(removed_keyword_names(&previous, &current), names(&["Infra", "Ops"]));
    }

    #[test]
    fn test_rename_removes_old_title() {
        let previous = collect_cleanup_keyword_names(&[], Some(Uuid::nil()), "Draft");
        let current = collect_cleanup_keyword_names(&[], Some(Uuid::nil()), "Final");
        assert_eq!(removed_keyword_names(&previous, &current), names(&["Draft"]));
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let removed = removed_keyword_names(&names(&["Infra"]), &names(&["infra"]));
        assert_eq!(removed, names(&["Infra"]));
    }
}
