use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Article store unavailable: {reason}")]
    StoreUnavailable { reason: String, retryable: bool },

    #[error("Index error: {reason}")]
    Index { reason: String, retryable: bool },

    #[error("Embedding error: {reason}")]
    Embedding { reason: String, retryable: bool },

    #[error("News feed error: {reason}")]
    Feed { reason: String, retryable: bool },

    #[error("Embedding model mismatch: index was built with {found}, embedder is {expected}")]
    ModelMismatch { expected: String, found: String },

    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether retrying the same call may succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::StoreUnavailable { retryable, .. }
            | Error::Index { retryable, .. }
            | Error::Embedding { retryable, .. }
            | Error::Feed { retryable, .. } => *retryable,
            Error::Io(_) => true,
            _ => false,
        }
    }

    pub fn store_unavailable(reason: impl Into<String>, retryable: bool) -> Self {
        Error::StoreUnavailable { reason: reason.into(), retryable }
    }

    pub fn index(reason: impl Into<String>, retryable: bool) -> Self {
        Error::Index { reason: reason.into(), retryable }
    }

    pub fn embedding(reason: impl Into<String>, retryable: bool) -> Self {
        Error::Embedding { reason: reason.into(), retryable }
    }

    pub fn feed(reason: impl Into<String>, retryable: bool) -> Self {
        Error::Feed { reason: reason.into(), retryable }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
