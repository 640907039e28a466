//! Error types and result types for resource, query and marshalling operations.
//!
//! Every fallible operation in this crate returns [`DocumentResult<T>`]. Errors are
//! surfaced synchronously to the caller; nothing in this layer retries.

use base64::DecodeError as Base64Error;
use chrono::ParseError as ChronoParseError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised by the mapping layer.
///
/// The variants cover schema declaration problems, identity violations, query
/// cardinality failures, wire-format problems and errors reported by the transport.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocumentError {
    /// A field descriptor or schema was declared with an unsupported option or name.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// An object id was assigned to an instance that already has one.
    /// The first argument is the class name, the second the existing id.
    #[error("Can not re-set object id of {0} (already {1})")]
    IdentityViolation(String, String),
    /// A singleton query matched no resources. The argument is the class name.
    #[error("Query on {0} returned no results")]
    DoesNotExist(String),
    /// A singleton query matched more than one resource.
    /// The first argument is the class name, the second the number of matches.
    #[error("Query on {0} returned {1} results, expected exactly one")]
    MultipleResultsReturned(String, usize),
    /// A pointer or lookup named a class the registry can not resolve.
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),
    /// A wire-tagged value carried a malformed payload (date, base64, ...).
    #[error("Parse error: {0}")]
    Parse(String),
    /// A batch was submitted with zero operations.
    #[error("Batch contains no operations")]
    EmptyBatch,
    /// A resource without an object id was used where a reference to a stored
    /// resource is required. The argument is the class name.
    #[error("Resource of class {0} has not been saved")]
    UnsavedReference(String),
    /// Serialization/deserialization error when converting to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// A transport response did not have the expected shape.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
    /// The transport reported a failure. The first argument is the service error
    /// code (0 when unknown), the second the message.
    #[error("Transport error {0}: {1}")]
    Transport(i64, String),
    /// One operation in a submitted batch failed.
    #[error("Batch item {index} failed with code {code}: {message}")]
    BatchItem {
        /// Position of the failed operation in submission order.
        index: usize,
        /// Service error code.
        code: i64,
        /// Service error message.
        message: String,
    },
}

/// A specialized `Result` type for mapping layer operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

impl From<SerdeJsonError> for DocumentError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentError::Serialization(err.to_string())
    }
}

impl From<Base64Error> for DocumentError {
    fn from(err: Base64Error) -> Self {
        DocumentError::Parse(format!("invalid base64 payload: {err}"))
    }
}

impl From<ChronoParseError> for DocumentError {
    fn from(err: ChronoParseError) -> Self {
        DocumentError::Parse(format!("invalid ISO-8601 date: {err}"))
    }
}
