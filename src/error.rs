//! Error types for clearway-rs.
//!
//! Every variant maps to a stable error code so callers can decide
//! whether an operation is retryable (re-fetch on conflict) or final.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} {id} was modified by another transaction")]
    ConcurrentModification { entity: &'static str, id: i64 },

    #[error("ETA edit limit reached: {count} of {max} edits used")]
    EditLimitExceeded { count: i32, max: i32 },

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable code for the caller layer.
    ///
    /// `concurrent_modification` is the only code where re-fetch-and-retry
    /// is the expected client response.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::ConcurrentModification { .. } => "concurrent_modification",
            Error::EditLimitExceeded { .. } => "edit_limit_exceeded",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::DuplicateKey(_) => "duplicate_key",
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Io(_) => "io",
            Error::Other(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(Error::Validation("x".into()).code(), "validation");
        assert_eq!(
            Error::ConcurrentModification {
                entity: "shipment",
                id: 7
            }
            .code(),
            "concurrent_modification"
        );
        assert_eq!(
            Error::EditLimitExceeded { count: 3, max: 3 }.code(),
            "edit_limit_exceeded"
        );
        assert_eq!(Error::Forbidden("x".into()).code(), "forbidden");
        assert_eq!(Error::NotFound("x".into()).code(), "not_found");
        assert_eq!(Error::DuplicateKey("x".into()).code(), "duplicate_key");
    }
}
