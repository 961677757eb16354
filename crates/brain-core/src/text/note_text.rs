//! Joining note texts.

/// Join the present, non-empty texts with a newline.
///
/// Returns `None` when nothing is left to join.
pub fn chain_with_newline<'a, I>(texts: I) -> Option<String>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let parts: Vec<&str> = texts
        .into_iter()
        .flatten()
        .filter(|t| !t.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

/// Append `suffix` to `base` on a new line.
pub fn append_with_newline(base: Option<&str>, suffix: Option<&str>) -> Option<String> {
    chain_with_newline([base, suffix])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_skips_missing_and_empty() {
        let joined = chain_with_newline([Some("one"), None, Some(""), Some("two")]);
        assert_eq!(joined.as_deref(), Some("one\ntwo"));
    }

    #[test]
    fn test_chain_nothing() {
        assert_eq!(chain_with_newline([None, Some("")]), None);
    }

    #[test]
    fn test_append_with_newline() {
        assert_eq!(
            append_with_newline(Some("base"), Some("more")).as_deref(),
            Some("base\nmore")
        );
        assert_eq!(append_with_newline(None, Some("more")).as_deref(), Some("more"));
        assert_eq!(append_with_newline(Some("base"), None).as_deref(), Some("base"));
    }
}
