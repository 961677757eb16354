//! Centralized default constants for brain.
//!
//! Shared values live here so the core and the database layer agree on
//! backend keys, title conventions, and patch parameters.

// =============================================================================
// TRANSACTION BACKENDS
// =============================================================================

/// Backend key of the relational store of record.
pub const SQL_BACKEND: &str = "sql";

/// Backend key of the graph projection.
pub const GRAPH_BACKEND: &str = "graph";

/// Backend whose controller receives `flush` requests.
pub const PRIMARY_FLUSH_BACKEND: &str = SQL_BACKEND;

// =============================================================================
// NOTE TITLES
// =============================================================================

/// Prefix for generated titles ("Untitled 1", "Untitled 2", ...).
pub const UNTITLED_PREFIX: &str = "Untitled";

// =============================================================================
// PATCHES
// =============================================================================

/// Characters of context kept around each patch hunk.
pub const PATCH_MARGIN: usize = 4;

/// Longest pattern a hunk context may grow to while searching for uniqueness.
pub const PATCH_MAX_PATTERN: usize = 32;
