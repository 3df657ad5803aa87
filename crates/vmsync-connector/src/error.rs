//! Collaborator error types
//!
//! Error definitions shared by the source and registry clients, with a
//! transport/rejection split the reconciliation engine uses to decide
//! whether a failure is local to one write or fatal to a whole run.

use thiserror::Error;

/// Error that can occur while talking to the source or the registry.
#[derive(Debug, Error)]
pub enum ConnectorError {
    // Transport errors (the remote system could not be reached)
    /// Failed to reach the remote system.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Request timed out.
    #[error("request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Remote system answered with a server-side failure.
    #[error("remote system unavailable: {message}")]
    Unavailable { message: String },

    // Authentication errors
    /// Credentials were rejected.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    // Write rejections
    /// A write collided with a uniqueness constraint in the target.
    #[error("duplicate {entity}: {message}")]
    DuplicateKey { entity: String, message: String },

    /// A write was rejected for any other validation reason.
    #[error("{entity} rejected by registry: {message}")]
    Validation { entity: String, message: String },

    /// The addressed entity does not exist.
    #[error("{entity} not found: {identifier}")]
    NotFound { entity: String, identifier: String },

    // Local errors
    /// Client configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// Response body could not be decoded.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

impl ConnectorError {
    /// Check if this error means the remote system could not be reached.
    ///
    /// Transport-class errors during the bulk listing phase abort a run;
    /// during per-record writes they fail only that record.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::Transport { .. }
                | ConnectorError::Timeout { .. }
                | ConnectorError::Unavailable { .. }
        )
    }

    /// Check if this error is a rejected write (uniqueness or validation).
    ///
    /// Rejections are abandoned per write and never abort the record.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            ConnectorError::DuplicateKey { .. } | ConnectorError::Validation { .. }
        )
    }

    /// Check if this error is a uniqueness violation.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ConnectorError::DuplicateKey { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::Transport { .. } => "TRANSPORT_ERROR",
            ConnectorError::Timeout { .. } => "TIMEOUT",
            ConnectorError::Unavailable { .. } => "UNAVAILABLE",
            ConnectorError::AuthenticationFailed { .. } => "AUTH_FAILED",
            ConnectorError::DuplicateKey { .. } => "DUPLICATE_KEY",
            ConnectorError::Validation { .. } => "VALIDATION_FAILED",
            ConnectorError::NotFound { .. } => "NOT_FOUND",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    // Convenience constructors

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        ConnectorError::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Create a transport error with source.
    pub fn transport_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::Transport {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a duplicate key error.
    pub fn duplicate(entity: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::DuplicateKey {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(entity: impl Into<String>, message: impl Into<String>) -> Self {
        ConnectorError::Validation {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(entity: impl Into<String>, identifier: impl ToString) -> Self {
        ConnectorError::NotFound {
            entity: entity.into(),
            identifier: identifier.to_string(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        ConnectorError::Serialization {
            message: message.into(),
        }
    }
}

/// Result type for collaborator operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
