//! Model registry errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ErrorReason, QuotaError};

/// Errors raised by model creation and deletion.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ModelError {
    /// A model with this name already exists for the user
    #[error("Model {name} already exists")]
    Duplicate {
        /// Conflicting model name
        name: String,
    },

    /// Model does not exist
    #[error("Model {name} not found")]
    NotFound {
        /// Model that was looked up
        name: String,
    },

    /// Model name failed validation
    #[error("Invalid model name {name:?}: {message}")]
    InvalidName {
        /// Rejected name
        name: String,
        /// Why it was rejected
        message: String,
    },

    /// Model has a training job in flight
    #[error("Model {name} has a training job in progress")]
    TrainingInProgress {
        /// Busy model
        name: String,
    },

    /// Asset cascade failed while deleting the model
    #[error("Storage unavailable while deleting {name}: {message}")]
    StorageUnavailable {
        /// Model being deleted
        name: String,
        /// Last storage failure
        message: String,
    },

    /// Model reservation failed
    #[error(transparent)]
    Quota(#[from] QuotaError),
}

impl ModelError {
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::Duplicate { .. } => ErrorReason::DuplicateModel,
            Self::NotFound { .. } => ErrorReason::NotFound,
            Self::InvalidName { .. } => ErrorReason::InvalidInput,
            Self::TrainingInProgress { .. } => ErrorReason::TrainingInProgress,
            Self::StorageUnavailable { .. } => ErrorReason::StorageUnavailable,
            Self::Quota(e) => e.reason(),
        }
    }
}
