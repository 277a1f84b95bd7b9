//!
//! Sysdata: hierarchical data records synchronised with external systems.
//! This library keeps one canonical view of an entity next to the views of
//! the backends it is exchanged with.
//!
//! ## Core Concepts
//!
//! * **Records (`record::Record`)**: Ordered maps of named fields. Fields hold scalar values or nested containers, so a record describes a whole entity tree.
//! * **Aspects (`record::AspectType`)**: Everything a field knows is an aspect keyed by scope. The canonical scope is the application's view; a `(system, direction)` scope is a backend's view of the same field.
//! * **Systems (`record::SystemId`)**: Backend identifiers. Values travel `From` a system into the canonical form on [`pull`](record::Record::pull) and `Onto` it on [`push`](record::Record::push), through the converters and validators declared for that scope.
//! * **Sequences (`record::Values`, `record::Records`)**: Index addressed lists with a current-index cursor that calculators and schema declarations can follow.
//! * **Schemas (`record::SystemSchema`)**: Declarative backend field mappings, applied to a record with `record::Record::add_system_fields`.

pub mod record;

/// Re-export the `Record` struct for easier access.
pub use record::Record;

/// Result type used throughout the Sysdata library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Sysdata library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured record errors from the record module
    #[error(transparent)]
    Record(record::RecordError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Record(_) => "record",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Record(record_err) => record_err.is_not_found(),
            Error::Io(io_err) => io_err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Check if this error is type-related.
    pub fn is_type_error(&self) -> bool {
        match self {
            Error::Record(record_err) => record_err.is_type_error(),
            _ => false,
        }
    }

    /// Check if this error comes from parsing an identifier or key.
    pub fn is_parse_error(&self) -> bool {
        match self {
            Error::Record(record_err) => record_err.is_parse_error(),
            Error::Serialize(_) => true,
            _ => false,
        }
    }

    /// Check if this error comes from a backend schema declaration.
    pub fn is_schema_error(&self) -> bool {
        match self {
            Error::Record(record_err) => record_err.is_schema_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}
