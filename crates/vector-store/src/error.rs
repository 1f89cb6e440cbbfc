use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Failed to load embedding model: {0}")]
    ModelLoadError(String),

    #[error("Embedding error: {0}")]
    EmbeddingError(String),

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Index error: {0}")]
    IndexError(String),

    #[error("Refusing to store empty or whitespace-only text")]
    EmptyText,

    #[error("Position {position} is out of range (store holds {len} entries)")]
    OutOfRange { position: usize, len: usize },

    #[error("Corrupt vector store at {}: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("Embedding model mismatch: store was built with '{stored}', current model is '{current}'")]
    ModelMismatch { stored: String, current: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl VectorStoreError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptStore {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// True when the persisted state cannot be trusted and a rebuild from
    /// chapter files is the only way forward.
    #[must_use]
    pub const fn is_corrupt(&self) -> bool {
        matches!(self, Self::CorruptStore { .. } | Self::ModelMismatch { .. })
    }
}
