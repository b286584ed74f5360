use thiserror::Error;

/// Failure taxonomy shared by every docqa crate.
///
/// Each message names the operation that failed followed by the cause, so a
/// caller can surface `to_string()` directly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("content extraction failed for '{source_name}': {reason}")]
    ContentExtraction { source_name: String, reason: String },

    #[error("index build failed at {path}: {reason}")]
    IndexBuild { path: String, reason: String },

    #[error("index unavailable at {path}: {reason}")]
    IndexNotFound { path: String, reason: String },

    #[error("index unavailable at {path}: built with embedder '{built_with}', loaded with '{loaded_with}'")]
    EmbeddingModelMismatch { path: String, built_with: String, loaded_with: String },

    #[error("answer generation failed ({provider}): {message}")]
    Generation { provider: String, message: String },

    #[error("invalid document id '{0}'")]
    InvalidDocumentId(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{operation} failed: {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn extraction(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::ContentExtraction { source_name: source_name.into(), reason: reason.to_string() }
    }

    pub fn build(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::IndexBuild { path: path.as_ref().display().to_string(), reason: reason.to_string() }
    }

    pub fn not_found(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        Self::IndexNotFound { path: path.as_ref().display().to_string(), reason: reason.to_string() }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { operation: operation.into(), source }
    }

    /// True for the errors a caller reports as "index unavailable".
    pub fn is_index_unavailable(&self) -> bool {
        matches!(self, Self::IndexNotFound { .. } | Self::EmbeddingModelMismatch { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
