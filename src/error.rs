//! # Error taxonomy
//!
//! Every fallible operation in the library returns [`Result<T>`], whose error
//! side is [`RecommendError`]. The variants split along the line callers care
//! about: can the same request succeed if it is tried again?
//!
//! - [`RecommendError::Transient`] is retryable (timeouts, rate limits, 5xx).
//! - [`RecommendError::Unavailable`] is what a transient failure becomes once
//!   the retry budget is spent. It is recoverable from the caller's point of
//!   view but is never collapsed into an empty result.
//! - Everything else is fatal for the current request.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building, loading, or querying the catalog index.
#[derive(Error, Debug)]
pub enum RecommendError {
    /// A catalog record (or catalog file) is malformed.
    #[error("invalid catalog record at position {position}: {reason}")]
    Validation { position: usize, reason: String },

    /// A vector's length disagrees with the index dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A search was issued against an index with no vectors.
    #[error("the vector index is empty")]
    EmptyIndex,

    /// The persisted index/store pair is inconsistent or unreadable.
    #[error("corrupt artifact {path}: {reason}")]
    CorruptStore { path: PathBuf, reason: String },

    /// Network or rate-limit failure; the same request may succeed later.
    #[error("transient failure calling {service}: {message}")]
    Transient {
        service: &'static str,
        message: String,
    },

    /// Authentication, configuration, or protocol failure; retrying won't help.
    #[error("fatal failure calling {service}: {message}")]
    Fatal {
        service: &'static str,
        message: String,
    },

    /// A transient failure that persisted through every retry.
    #[error("{service} unavailable after {attempts} attempts: {message}")]
    Unavailable {
        service: &'static str,
        attempts: u32,
        message: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("template error: {0}")]
    Template(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RecommendError>;

impl RecommendError {
    pub(crate) fn validation(position: usize, reason: impl Into<String>) -> Self {
        Self::Validation {
            position,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// `true` only for [`RecommendError::Transient`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// `true` when the failure means "try again later" rather than "broken".
    ///
    /// The CLI prints a retry-later notice for these before the error itself.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Unavailable { .. })
    }
}
