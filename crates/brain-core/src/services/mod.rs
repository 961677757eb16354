//! Note services: the operations that keep both stores consistent.

pub mod notes;
pub mod titles;

pub use notes::NoteService;
