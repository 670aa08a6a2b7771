//! Error types for mailclass

/// Result type alias using mailclass's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for mailclass operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Artifact bundle missing, unreadable or inconsistent
    #[error("artifact error: {0}")]
    Artifact(String),

    /// Embedding model resolution or inference errors
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Classifier execution errors
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new artifact error
    pub fn artifact(msg: impl Into<String>) -> Self {
        Self::Artifact(msg.into())
    }

    /// Create a new embedding error
    pub fn embedding(msg: impl Into<String>) -> Self {
        Self::Embedding(msg.into())
    }

    /// Create a new classifier error
    pub fn classifier(msg: impl Into<String>) -> Self {
        Self::Classifier(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short, stable name of the error kind (used as a metrics label)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Artifact(_) => "artifact",
            Self::Embedding(_) => "embedding",
            Self::Classifier(_) => "classifier",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }
}
