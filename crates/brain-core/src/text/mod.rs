//! Text change engine: diffs, patches and wikilink spans.

pub mod diff;
pub mod note_text;
pub mod patch;
pub mod wikilinks;

pub use diff::{diff, inserts_brackets, ranges_touched, source_text, target_text, Diff, DiffOp};
pub use note_text::{append_with_newline, chain_with_newline};
pub use patch::{
    apply_patch, apply_patches, make_patch, patch_from_text, patch_to_text, patches_from_diffs,
    Patch,
};
pub use wikilinks::{extract_link_intervals, extract_link_targets};
