//! Error types for the Minecraft provider.

use std::path::PathBuf;

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors that can occur while serving provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested resource was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A file referenced by configuration could not be read.
    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Build an [`ProviderError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get the error message as a string.
    pub fn message(&self) -> String {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::FailedPrecondition(msg)
            | Self::InvalidRequest(msg) => msg.clone(),
            Self::Serialization(err) => err.to_string(),
            Self::Io { path, source } => format!("{}: {}", path.display(), source),
        }
    }

    /// The attribute this error relates to, when one is known.
    fn attribute(&self) -> Option<&'static str> {
        match self {
            Self::Io { .. } => Some("schema_path"),
            _ => None,
        }
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        let diagnostic = Diagnostic::error(err.to_string());
        match err.attribute() {
            Some(attribute) => diagnostic.with_attribute(attribute),
            None => diagnostic,
        }
    }
}
