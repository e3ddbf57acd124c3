//! Error Types
//!
//! Errors raised while building core values (identifiers and documents).

use thiserror::Error;

/// Error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// An identifier could not be parsed.
    #[error("Failed to parse {id_type}: {message}")]
    InvalidId {
        /// The type of ID that failed to parse
        id_type: &'static str,
        /// Why parsing failed
        message: String,
    },

    /// A value could not be interpreted as a CI document.
    #[error("Invalid document: {message}")]
    InvalidDocument {
        /// Description of the problem
        message: String,
    },
}

impl CoreError {
    /// Create an invalid document error.
    pub fn invalid_document(message: impl Into<String>) -> Self {
        Self::InvalidDocument {
            message: message.into(),
        }
    }
}

/// Type alias for Results using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_id_display() {
        let err = CoreError::InvalidId {
            id_type: "InstanceId",
            message: "invalid digit found in string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to parse InstanceId: invalid digit found in string"
        );
    }

    #[test]
    fn test_invalid_document_display() {
        let err = CoreError::invalid_document("expected a JSON object");
        assert_eq!(err.to_string(), "Invalid document: expected a JSON object");
    }
}
