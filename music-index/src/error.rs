//! Error types for library scanning and queries.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IndexError {
    /// A file or directory could not be read or written.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tag container of an audio file could not be parsed.
    #[error("failed to read tags from {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    /// The persisted index could not be written or decoded.
    #[error("index persistence failed: {0}")]
    Persist(String),

    /// A query named an artist, album or listing that does not exist.
    #[error("{what} not found: {name}")]
    NotFound { what: &'static str, name: String },

    #[error("art lookup failed: {0}")]
    Art(String),
}

impl IndexError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IndexError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(what: &'static str, name: impl Into<String>) -> Self {
        IndexError::NotFound {
            what,
            name: name.into(),
        }
    }

    /// Stable classification used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            IndexError::Io { .. } => "io",
            IndexError::Metadata { .. } => "metadata",
            IndexError::Persist(_) => "persist",
            IndexError::NotFound { .. } => "not_found",
            IndexError::Art(_) => "art",
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
