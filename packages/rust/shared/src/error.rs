//! Error types for NeuroGraph.
//!
//! Library crates use [`NeurographError`] via `thiserror`.
//! The `neurograph` binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all NeuroGraph operations.
#[derive(Debug, thiserror::Error)]
pub enum NeurographError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A remote service answered with a non-success status.
    #[error("{service} API error: {status} - {body}")]
    Remote {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The remote call could not complete (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// A job, artifact, metadata document, or file does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// A requested path escapes the directory it must stay inside.
    #[error("access denied: {message}")]
    PermissionDenied { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed metadata, invalid identifiers, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Zip archive creation error.
    #[error("archive error: {0}")]
    Archive(String),

    /// A background or blocking task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NeurographError>;

impl NeurographError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a not-found error from any displayable message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Create a permission error from any displayable message.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means a remote call failed (status or transport).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Remote { .. } | Self::Network(_))
    }
}
