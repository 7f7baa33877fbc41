//! Error types for the recognizer.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using the recognizer's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type returned by collaborators and clients.
#[derive(Error, Debug)]
pub enum Error {
    /// Extraction engine failed to start or run
    #[error("Engine error: {0}")]
    Engine(String),

    /// Item or file storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input (including identifiers a lookup service refuses)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// A recognition stage failed
    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

/// Failure reasons carried by work and task events.
///
/// Unlike [`Error`] this type is `Clone`, so a single failure can be fanned
/// out to every subscriber of a broadcast stream.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "message", rename_all = "snake_case")]
pub enum RecognitionError {
    #[error("Extraction engine failed: {0}")]
    EngineFailure(String),

    #[error("Extraction was cancelled")]
    EngineCancelled,

    #[error("Remote classification failed: {0}")]
    RemoteClassificationFailure(String),

    #[error("Classifier returned no candidate identifiers")]
    NoCandidateIdentifiers,

    /// Per-candidate; drives substitution and is never surfaced on a task.
    #[error("Identifier lookup failed: {0}")]
    LookupFailure(String),

    /// Per-candidate; drives substitution and is never surfaced on a task.
    #[error("Could not parse lookup result: {0}")]
    ParseFailure(String),

    #[error("No remaining identifiers for lookup")]
    IdentifiersExhausted,

    #[error("Could not create parent item: {0}")]
    ParentCreationFailure(String),

    #[error("Unexpected state: {0}")]
    UnexpectedState(String),
}

impl RecognitionError {
    /// Whether the pipeline recovers from this error by trying the next candidate.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::LookupFailure(_) | Self::ParseFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_engine() {
        let err = Error::Engine("pdftotext missing".to_string());
        assert_eq!(err.to_string(), "Engine error: pdftotext missing");
    }

    #[test]
    fn test_error_display_storage() {
        let err = Error::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }

    #[test]
    fn test_error_display_request() {
        let err = Error::Request("network unreachable".to_string());
        assert_eq!(err.to_string(), "Request error: network unreachable");
    }

    #[test]
    fn test_recognition_error_is_transparent() {
        let err: Error = RecognitionError::IdentifiersExhausted.into();
        assert_eq!(err.to_string(), "No remaining identifiers for lookup");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("access denied"));
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(RecognitionError::LookupFailure("503".into()).is_recoverable());
        assert!(RecognitionError::ParseFailure("no title".into()).is_recoverable());
        assert!(!RecognitionError::IdentifiersExhausted.is_recoverable());
        assert!(!RecognitionError::NoCandidateIdentifiers.is_recoverable());
        assert!(!RecognitionError::EngineCancelled.is_recoverable());
    }

    #[test]
    fn test_recognition_error_serializes_with_reason() {
        let json = serde_json::to_value(RecognitionError::ParentCreationFailure(
            "rename failed".into(),
        ))
        .unwrap();
        assert_eq!(json["reason"], "parent_creation_failure");
        assert_eq!(json["message"], "rename failed");

        let json = serde_json::to_value(RecognitionError::EngineCancelled).unwrap();
        assert_eq!(json["reason"], "engine_cancelled");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
        assert_send::<RecognitionError>();
    }
}
