//! Errors reported by external collaborators (storage, training backend, identity, billing).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of a call to an external service.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum CollaboratorError {
    /// Service could not be reached or timed out
    #[error("{service} unavailable: {message}")]
    Unavailable {
        /// Name of the external service
        service: String,
        /// Transport-level failure description
        message: String,
    },

    /// Service answered with an error status
    #[error("{service} rejected request ({status}): {message}")]
    Rejected {
        /// Name of the external service
        service: String,
        /// HTTP status code returned
        status: u16,
        /// Response body or summary
        message: String,
    },

    /// Requested object does not exist on the service
    #[error("{service}: {what} not found")]
    NotFound {
        /// Name of the external service
        service: String,
        /// Description of the missing object
        what: String,
    },

    /// Service answered with a payload we could not interpret
    #[error("{service} returned an invalid response: {message}")]
    InvalidResponse {
        /// Name of the external service
        service: String,
        /// Parse failure description
        message: String,
    },
}

impl CollaboratorError {
    pub fn unavailable(service: &str, message: impl Into<String>) -> Self {
        Self::Unavailable { service: service.to_string(), message: message.into() }
    }

    pub fn rejected(service: &str, status: u16, message: impl Into<String>) -> Self {
        Self::Rejected { service: service.to_string(), status, message: message.into() }
    }

    pub fn invalid_response(service: &str, message: impl Into<String>) -> Self {
        Self::InvalidResponse { service: service.to_string(), message: message.into() }
    }

    /// Check if this is a temporary error that may resolve on retry.
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Unavailable { .. } => true,
            Self::Rejected { status, .. } => *status == 429 || *status >= 500,
            Self::NotFound { .. } | Self::InvalidResponse { .. } => false,
        }
    }
}
