//! Training orchestrator errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ErrorReason, QuotaError};

/// Errors raised while submitting or tracking training jobs.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum TrainingError {
    /// Asset count outside the accepted training range
    #[error("Training needs between {min} and {max} images, model has {count}")]
    InsufficientAssets {
        /// Images attached to the model
        count: usize,
        /// Minimum accepted
        min: usize,
        /// Maximum accepted
        max: usize,
    },

    /// Model already has a queued or running job
    #[error("Model {model_name} already has a training job in progress")]
    InProgress {
        /// Busy model
        model_name: String,
    },

    /// Model does not exist
    #[error("Model {model_name} not found")]
    ModelNotFound {
        /// Model that was looked up
        model_name: String,
    },

    /// Job id is unknown
    #[error("Training job {job_id} not found")]
    JobNotFound {
        /// Job that was looked up
        job_id: String,
    },

    /// Training backend failed after retries
    #[error("Training backend unavailable: {message}")]
    BackendUnavailable {
        /// Last backend failure
        message: String,
    },

    /// Polling gave up before the job finished
    #[error("Training job {job_id} timed out; it may still finish remotely")]
    TimedOut {
        /// Job that timed out
        job_id: String,
    },

    /// Training reservation failed
    #[error(transparent)]
    Quota(#[from] QuotaError),
}

impl TrainingError {
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::InsufficientAssets { .. } => ErrorReason::InsufficientAssets,
            Self::InProgress { .. } => ErrorReason::TrainingInProgress,
            Self::ModelNotFound { .. } | Self::JobNotFound { .. } => ErrorReason::NotFound,
            Self::BackendUnavailable { .. } => ErrorReason::TrainingBackendUnavailable,
            Self::TimedOut { .. } => ErrorReason::TrainingTimedOut,
            Self::Quota(e) => e.reason(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_assets_message() {
        let err = TrainingError::InsufficientAssets { count: 7, min: 8, max: 15 };
        assert!(err.to_string().contains("between 8 and 15"));
        assert_eq!(err.reason(), ErrorReason::InsufficientAssets);
    }
}
