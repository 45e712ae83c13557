//! Directory error types
//!
//! Error definitions for configuration, entity resolution, connection and
//! protocol failures. Nothing in this crate retries; every variant is handed
//! back to the caller as-is.

use std::path::PathBuf;

use thiserror::Error;

/// Error that can occur during directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Configuration errors (fatal at startup)
    /// Configuration document is malformed or violates an invariant.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Configuration file could not be read.
    #[error("failed to read configuration file {}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source identifier that is not declared under `sources`.
    #[error("unknown directory source: {source_id}")]
    UnknownSource { source_id: String },

    // Resolution errors
    /// Entity identifier is neither a singular nor a plural name in the DIT.
    #[error("entity '{entity}' is not mapped to any DIT location")]
    EntityNotFound { entity: String },

    // Connection errors
    /// Failed to open or bind the connection for a source.
    #[error("connection to source '{source_id}' failed: {message}")]
    ConnectionFailed {
        source_id: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The directory rejected the bind credentials.
    #[error("authentication failed for source '{source_id}': invalid credentials")]
    AuthenticationFailed { source_id: String },

    // Protocol errors
    /// The request could not be carried out by the protocol client.
    #[error("{operation} failed: {message}")]
    OperationFailed {
        operation: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The directory answered with a non-success result code.
    #[error("{operation} rejected with code {rc}: {text}")]
    Rejected {
        operation: &'static str,
        rc: u32,
        text: String,
    },

    // Decoding errors
    /// An attribute value is not valid UTF-8.
    #[error("value of attribute '{attribute}' is not valid UTF-8")]
    Decoding {
        attribute: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

impl DirectoryError {
    /// Check if this error came from establishing a connection.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DirectoryError::ConnectionFailed { .. } | DirectoryError::AuthenticationFailed { .. }
        )
    }

    /// Check if this error describes a bad configuration.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            DirectoryError::InvalidConfiguration { .. }
                | DirectoryError::ConfigRead { .. }
                | DirectoryError::UnknownSource { .. }
        )
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            DirectoryError::ConfigRead { .. } => "CONFIG_READ_FAILED",
            DirectoryError::UnknownSource { .. } => "UNKNOWN_SOURCE",
            DirectoryError::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            DirectoryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            DirectoryError::AuthenticationFailed { .. } => "AUTH_FAILED",
            DirectoryError::OperationFailed { .. } => "OPERATION_FAILED",
            DirectoryError::Rejected { .. } => "OPERATION_REJECTED",
            DirectoryError::Decoding { .. } => "DECODING_FAILED",
        }
    }

    // Convenience constructors

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        DirectoryError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create a connection failed error.
    pub fn connection_failed(source_id: impl Into<String>, message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            source_id: source_id.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failed error with source.
    pub fn connection_failed_with_source(
        source_id: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            source_id: source_id.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an operation failed error.
    pub fn operation_failed(operation: &'static str, message: impl Into<String>) -> Self {
        DirectoryError::OperationFailed {
            operation,
            message: message.into(),
            source: None,
        }
    }

    /// Create an operation failed error with source.
    pub fn operation_failed_with_source(
        operation: &'static str,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::OperationFailed {
            operation,
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
