//! Reconciliation Error Types
//!
//! Every failure of a single inbound message maps to one of these variants.
//! Cache failures never surface here; they are swallowed by the gateway.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that terminate the reconciliation of one message.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The inbound message is malformed. The message is dropped.
    #[error("Malformed message: {message}")]
    Parse { message: String },

    /// The model's uniqueness configuration is unusable.
    #[error("Configuration error for object type {object_type}: {message}")]
    Configuration {
        object_type: String,
        message: String,
    },

    /// A must-check attribute has no value in the inbound document.
    #[error("Missing value for unique attribute {attribute} of {object_type}")]
    MissingUniqueValue {
        object_type: String,
        attribute: String,
    },

    /// A store call failed. Terminal for the message, never retried.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(object_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            object_type: object_type.into(),
            message: message.into(),
        }
    }

    /// Create a missing-unique-value error.
    pub fn missing_unique_value(
        object_type: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self::MissingUniqueValue {
            object_type: object_type.into(),
            attribute: attribute.into(),
        }
    }

    /// True if the message was dropped because of its own content.
    #[must_use]
    pub fn is_dropped(&self) -> bool {
        matches!(self, Self::Parse { .. } | Self::MissingUniqueValue { .. })
    }

    /// True if the error points at broken configuration or infrastructure.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::Store(_))
    }

    /// Short machine-readable code for logs and counters.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::Configuration { .. } => "configuration_error",
            Self::MissingUniqueValue { .. } => "missing_unique_value",
            Self::Store(_) => "store_error",
        }
    }
}

/// Result type for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropped_classification() {
        assert!(ReconcileError::parse("bad json").is_dropped());
        assert!(ReconcileError::missing_unique_value("host", "bk_host_innerip").is_dropped());
        assert!(!ReconcileError::configuration("host", "no rule").is_dropped());
        assert!(!ReconcileError::from(StoreError::backend("down")).is_dropped());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ReconcileError::configuration("host", "two rules").is_fatal());
        assert!(ReconcileError::from(StoreError::backend("down")).is_fatal());
        assert!(!ReconcileError::parse("bad json").is_fatal());
    }

    #[test]
    fn test_display() {
        let err = ReconcileError::missing_unique_value("bk_switch", "bk_inst_name");
        assert_eq!(
            err.to_string(),
            "Missing value for unique attribute bk_inst_name of bk_switch"
        );
        assert_eq!(err.error_code(), "missing_unique_value");

        let err = ReconcileError::from(StoreError::backend("connection refused"));
        assert_eq!(err.to_string(), "Store backend error: connection refused");
    }
}
