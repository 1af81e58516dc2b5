use thiserror::Error;

/// Errors produced while translating a document or a field.
///
/// Every variant is terminal for the request that raised it. Nothing in the
/// engine retries; the HTTP layer maps each kind to a status code.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// Malformed or incomplete job payload
    #[error("invalid request: {0}")]
    Input(String),

    /// Source document, target document or source field is absent or empty
    #[error("not found: {0}")]
    NotFound(String),

    /// Translation backend call failed or returned a non-success status
    #[error("translation backend error: {0}")]
    Backend(String),

    /// Document store query or mutation failed
    #[error("document store error: {0}")]
    Store(String),

    /// A family resolved to more than one registry record
    #[error("inconsistent translation metadata: {0}")]
    InconsistentState(String),
}

impl TranslateError {
    /// Short machine-readable name of the error kind, used in logs and responses.
    pub fn kind(&self) -> &'static str {
        match self {
            TranslateError::Input(_) => "input",
            TranslateError::NotFound(_) => "not_found",
            TranslateError::Backend(_) => "backend",
            TranslateError::Store(_) => "store",
            TranslateError::InconsistentState(_) => "inconsistent_state",
        }
    }
}

pub type Result<T> = std::result::Result<T, TranslateError>;
