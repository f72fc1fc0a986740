//! Error types for bookshelf operations

use std::fmt;
use thiserror::Error;

/// Bookshelf operation result type
pub type Result<T> = std::result::Result<T, BookshelfError>;

/// Bookshelf operation errors
#[derive(Error, Debug)]
pub enum BookshelfError {
    /// Book id failed validation
    #[error("Invalid book id '{book_id}': {reason}")]
    InvalidBookId { book_id: String, reason: String },

    /// Book-relative path failed validation
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Glob or regular expression could not be compiled
    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Path does not exist in the storage backend
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// Storage backend failed while touching `path`
    #[error("Backend error on {path}: {message}")]
    Backend { path: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Archive writer failed
    #[error("Archive error: {0}")]
    Archive(String),

    /// Audit store failed. Never surfaced from a primary operation.
    #[error("Audit write failed: {0}")]
    Audit(String),

    /// Request was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse error taxonomy reported to callers alongside the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad book id, path, or pattern. Rejected before any I/O.
    Validation,
    /// Target path is absent
    NotFound,
    /// Underlying storage failed; the caller may retry
    Backend,
    /// Audit store failed; logged and swallowed
    AuditWriteFailure,
    /// Caller went away before the operation finished
    Cancelled,
}

impl ErrorKind {
    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Backend => "BACKEND_ERROR",
            ErrorKind::AuditWriteFailure => "AUDIT_WRITE_FAILURE",
            ErrorKind::Cancelled => "CANCELLED",
        }
    }

    /// Only backend failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Backend)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl BookshelfError {
    /// Project this error onto the caller-facing taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookshelfError::InvalidBookId { .. }
            | BookshelfError::InvalidPath { .. }
            | BookshelfError::InvalidPattern { .. }
            | BookshelfError::Config(_) => ErrorKind::Validation,
            BookshelfError::NotFound { .. } => ErrorKind::NotFound,
            BookshelfError::Audit(_) => ErrorKind::AuditWriteFailure,
            BookshelfError::Cancelled => ErrorKind::Cancelled,
            BookshelfError::Backend { .. }
            | BookshelfError::Io(_)
            | BookshelfError::Serialization(_)
            | BookshelfError::Archive(_) => ErrorKind::Backend,
        }
    }

    /// Shorthand for a validation failure on a path
    pub fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        BookshelfError::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a backend failure on a path
    pub fn backend(path: impl Into<String>, message: impl fmt::Display) -> Self {
        BookshelfError::Backend {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Map an `io::Error` raised while touching `path`, keeping NotFound distinct
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            BookshelfError::NotFound {
                path: path.to_string(),
            }
        } else {
            BookshelfError::backend(path, err)
        }
    }
}
