use thiserror::Error;

/// The one message every authentication failure surfaces, regardless of
/// cause. Callers must not be able to tell an unknown account from a wrong
/// password or a rejected code.
pub const GENERIC_AUTH_MESSAGE: &str = "invalid credentials";

/// The one message every cryptographic failure surfaces. Tag mismatches,
/// AAD mismatches, and malformed envelopes are indistinguishable from the
/// outside; the distinction is logged internally only.
pub const GENERIC_CRYPTO_MESSAGE: &str = "unable to process confidential content";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{}", GENERIC_AUTH_MESSAGE)]
    Authentication,

    #[error("forbidden: {0}")]
    Authorization(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{}", GENERIC_CRYPTO_MESSAGE)]
    Crypto,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("dependency unavailable: {0}")]
    Dependency(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Dependency failures are the only class the caller may retry; nothing
    /// in the core retries internally.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Dependency(_))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}
