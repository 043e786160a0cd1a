use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures raised by a key-value backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by the progress store and curriculum engine.
///
/// A failed mutation never leaves partial state behind: the in-memory view
/// is only replaced after the write succeeds.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load {key}: {source}")]
    Load {
        key: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("failed to persist {key}: {source}")]
    Persist {
        key: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("invalid curriculum catalog: {0}")]
    Catalog(String),
}

impl EngineError {
    pub fn is_persistence(&self) -> bool {
        matches!(self, EngineError::Load { .. } | EngineError::Persist { .. })
    }
}
