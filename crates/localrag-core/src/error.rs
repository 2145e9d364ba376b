use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Unsupported input: {0}")]
    Unsupported(String),

    /// Writing durable state failed. Never swallowed: callers own the retry.
    #[error("Failed to persist {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Pipeline run was abandoned by the caller")]
    Cancelled,

    /// Failure reported by an external collaborator (embedder, vector store, inference).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl Error {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
