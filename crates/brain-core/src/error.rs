//! Error types for brain.

use thiserror::Error;

/// Result type alias using brain's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for brain operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Note not found
    #[error("Note not found: {0}")]
    NoteNotFound(uuid::Uuid),

    /// A patch could not be applied to the current note text
    #[error("Failed to apply patch: {0}")]
    PatchApply(String),

    /// Another note of the same user already has this title
    #[error("Note title already exists: {0}")]
    TitleAlreadyExists(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Forbidden (authenticated but not the owner)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A backend handle was expected in the transaction context but is absent
    #[error("Transaction handle not available for backend: {0}")]
    MissingHandle(String),

    /// No controller is registered under the requested backend key
    #[error("Unknown transaction backend: {0}")]
    UnknownBackend(String),

    /// Unit of work used outside its lifecycle
    #[error("Unit of work error: {0}")]
    UnitOfWork(String),

    /// Some backends committed before another one failed.
    ///
    /// The committed backends are not undone. Reconciliation has to replay
    /// the relational state onto the graph projection.
    #[error("Partial commit: committed {committed:?}, failed on {failed}: {source}")]
    PartialCommit {
        committed: Vec<String>,
        failed: String,
        #[source]
        source: Box<Error>,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// Whether this error means the requested entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::NoteNotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_patch_apply() {
        let err = Error::PatchApply("hunk 1 does not match".to_string());
        assert_eq!(err.to_string(), "Failed to apply patch: hunk 1 does not match");
    }

    #[test]
    fn test_error_display_partial_commit() {
        let err = Error::PartialCommit {
            committed: vec!["sql".to_string()],
            failed: "graph".to_string(),
            source: Box::new(Error::Internal("connection reset".to_string())),
        };
        let msg = err.to_string();
        assert!(msg.contains("\"sql\""));
        assert!(msg.contains("failed on graph"));
        assert!(msg.contains("connection reset"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(Error::NoteNotFound(Uuid::nil()).is_not_found());
        assert!(Error::NotFound("x".to_string()).is_not_found());
        assert!(!Error::Forbidden("x".to_string()).is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
