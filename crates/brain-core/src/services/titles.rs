//! Note title rules.

use crate::defaults::UNTITLED_PREFIX;

/// Trimmed title, or `None` when blank or absent.
pub fn normalize_title(title: Option<&str>) -> Option<&str> {
    title.map(str::trim).filter(|t| !t.is_empty())
}

/// The `n`-th generated title.
pub fn untitled_title(n: u32) -> String {
    format!("{} {}", UNTITLED_PREFIX, n)
}
