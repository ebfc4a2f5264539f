//! Authentication errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ErrorReason;

/// Errors raised while resolving the calling user.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum AuthError {
    /// No valid session for the request
    #[error("Not authenticated")]
    Unauthenticated,

    /// Identity service could not be consulted
    #[error("Identity provider unavailable: {message}")]
    ProviderUnavailable {
        /// Failure description
        message: String,
    },
}

impl AuthError {
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::Unauthenticated => ErrorReason::Unauthenticated,
            Self::ProviderUnavailable { .. } => ErrorReason::Internal,
        }
    }
}
