//! # Error Handling
//!
//! Error types for the gatewright compiler core, defined with `thiserror`.
//!
//! Most problems found during synthesis are *not* errors in this sense: they
//! are posted to the [`crate::diagnostics::DiagnosticSink`] attached to the
//! offending resource, and compilation continues. The `Error` enum below is
//! reserved for conditions that make an API call itself unusable — bad
//! settings, malformed snapshot construction, serialization failures.

/// Custom result type for gatewright operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the gatewright compiler
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Configuration errors (settings loading or validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors on caller-supplied data
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// A referenced entity does not exist in the snapshot
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound { resource_type: String, id: String },

    /// Synthesis failed in a way that cannot be attributed to a single
    /// resource (programmer error or resource exhaustion)
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a synthesis error
    pub fn synthesis<S: Into<String>>(message: S) -> Self {
        Self::Synthesis(message.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(error: config::ConfigError) -> Self {
        Self::Config(error.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
