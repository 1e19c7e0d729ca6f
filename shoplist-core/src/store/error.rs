//! Store error types.

use thiserror::Error;

/// Errors returned by a remote store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Unknown field '{field}' on {collection}")]
    UnknownField { collection: String, field: String },

    #[error("Field '{0}' is assigned by the store")]
    ReadOnlyField(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Refusing to {0} without a filter")]
    UnfilteredWrite(&'static str),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Record not found")]
    NotFound,

    #[error("Malformed record: {0}")]
    Decode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True when the request itself was rejected, so retrying it unchanged
    /// cannot succeed.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            StoreError::UnknownCollection(_)
                | StoreError::UnknownField { .. }
                | StoreError::ReadOnlyField(_)
                | StoreError::InvalidValue { .. }
                | StoreError::UnfilteredWrite(_)
                | StoreError::Constraint(_)
        )
    }
}

/// Errors returned by blob storage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlobError {
    #[error("Invalid blob name: {0}")]
    InvalidName(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("I/O error for blob {name}: {reason}")]
    Io { name: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejections_are_not_retryable() {
        assert!(StoreError::UnfilteredWrite("delete").is_rejection());
        assert!(StoreError::Constraint("quantity".into()).is_rejection());
        assert!(!StoreError::Transport("timed out".into()).is_rejection());
        assert!(!StoreError::Backend("disk full".into()).is_rejection());
    }

    #[test]
    fn test_display() {
        let err = StoreError::UnknownField {
            collection: "shopping_items".into(),
            field: "price".into(),
        };
        assert_eq!(err.to_string(), "Unknown field 'price' on shopping_items");
    }
}
