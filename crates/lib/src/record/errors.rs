//! Error types for record operations.
//!
//! Structural misuse of the record tree (malformed paths, a value and a
//! calculator on the same aspect key, writes with `extend` disabled) panics.
//! The variants here cover the fallible edges: parsing identifiers and keys,
//! strict lookups, and declarative input coming from outside the process.

use thiserror::Error;

/// Structured error types for record operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RecordError {
    /// No field resolves at the given index path
    #[error("Field not found: {path}")]
    FieldNotFound { path: String },

    /// A backend/system id does not follow the identifier grammar
    #[error("Invalid system id '{id}': {reason}")]
    InvalidSystemId { id: String, reason: String },

    /// An aspect key string could not be decomposed
    #[error("Invalid aspect key '{key}': {reason}")]
    InvalidAspectKey { key: String, reason: String },

    /// An index path cannot address a field
    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Direction token is neither `From` nor `Onto`
    #[error("Invalid direction '{direction}'")]
    InvalidDirection { direction: String },

    /// Unknown action tag
    #[error("Invalid action '{action}'")]
    InvalidAction { action: String },

    /// A node of another kind was found where a specific kind was required
    #[error("Type mismatch at {path}: expected {expected}, found {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// A declarative schema could not be applied
    #[error("Invalid schema for system {system}: {reason}")]
    InvalidSchema { system: String, reason: String },

    /// A named converter or validator is not registered
    #[error("Unknown {kind} '{name}'")]
    UnknownCallable { kind: String, name: String },
}

impl RecordError {
    /// Check if this error indicates that a field was not found
    pub fn is_not_found(&self) -> bool {
        matches!(self, RecordError::FieldNotFound { .. })
    }

    /// Check if this error was raised while parsing an identifier or key
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            RecordError::InvalidSystemId { .. }
                | RecordError::InvalidAspectKey { .. }
                | RecordError::InvalidPath { .. }
                | RecordError::InvalidDirection { .. }
                | RecordError::InvalidAction { .. }
        )
    }

    /// Check if this error is related to type mismatches
    pub fn is_type_error(&self) -> bool {
        matches!(self, RecordError::TypeMismatch { .. })
    }

    /// Check if this error comes from schema declaration input
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            RecordError::InvalidSchema { .. } | RecordError::UnknownCallable { .. }
        )
    }
}

impl From<RecordError> for crate::Error {
    fn from(err: RecordError) -> Self {
        crate::Error::Record(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = RecordError::FieldNotFound {
            path: "A/0/B".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_parse_error());
        assert_eq!(err.to_string(), "Field not found: A/0/B");

        let err = RecordError::InvalidDirection {
            direction: "To".to_string(),
        };
        assert!(err.is_parse_error());

        let err = RecordError::UnknownCallable {
            kind: "converter".to_string(),
            name: "hex".to_string(),
        };
        assert!(err.is_schema_error());
        assert_eq!(err.to_string(), "Unknown converter 'hex'");
    }

    #[test]
    fn test_into_crate_error() {
        let err: crate::Error = RecordError::FieldNotFound {
            path: "X".to_string(),
        }
        .into();
        assert!(err.is_not_found());
        assert_eq!(err.module(), "record");
    }
}
