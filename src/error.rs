//! Error taxonomy shared by the stores and repositories.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    /// Object or document is absent. Often a trigger for creation rather than a failure.
    #[error("not found: {0}")]
    NotFound(String),

    /// More than one document matched where exactly one was expected.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    Validation(String),

    /// Network, auth or quota failure reported by a hosted service.
    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DataError>;

impl DataError {
    pub fn not_found(what: impl Into<String>) -> Self {
        DataError::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DataError::Validation(message.into())
    }

    pub fn backend(message: impl Into<String>) -> Self {
        DataError::Backend(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DataError::NotFound(_))
    }

    /// Transport-class errors are mirrored into the error channel; validation
    /// and conflict errors only go back to the caller.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            DataError::Backend(_) | DataError::Sqlite(_) | DataError::Json(_) | DataError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert!(DataError::not_found("images/a.jpg").is_not_found());
        assert!(!DataError::validation("empty id").is_transport());
        assert!(!DataError::Conflict("two".into()).is_transport());
        assert!(DataError::backend("quota").is_transport());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert!(DataError::from(io).is_transport());
    }

    #[test]
    fn test_error_display() {
        let err = DataError::validation("Person ID cannot be empty");
        assert_eq!(err.to_string(), "invalid request: Person ID cannot be empty");
    }
}
