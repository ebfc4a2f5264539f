//! Image generation errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ErrorReason;

/// Errors raised while generating images from a trained model.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum GenerationError {
    /// Model does not exist
    #[error("Model {model_name} not found")]
    ModelNotFound {
        /// Model that was looked up
        model_name: String,
    },

    /// Model has no successfully trained weights
    #[error("Model {model_name} has no trained weights yet")]
    NotTrained {
        /// Model that was asked to generate
        model_name: String,
    },

    /// Prompt or output count rejected
    #[error("Invalid generation request: {message}")]
    InvalidRequest {
        /// What was wrong with the request
        message: String,
    },

    /// Backend could not be reached after retries
    #[error("Generation backend unavailable: {message}")]
    BackendUnavailable {
        /// Last backend failure
        message: String,
    },

    /// Backend ran the prediction and it failed, or refused it
    #[error("Generation failed: {message}")]
    Failed {
        /// Failure reported by the backend
        message: String,
    },

    /// Prediction did not finish within the polling budget
    #[error("Prediction {prediction_id} did not finish in time")]
    TimedOut {
        /// Prediction that was abandoned
        prediction_id: String,
    },
}

impl GenerationError {
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::ModelNotFound { .. } => ErrorReason::NotFound,
            Self::NotTrained { .. } => ErrorReason::ModelNotTrained,
            Self::InvalidRequest { .. } => ErrorReason::InvalidInput,
            Self::BackendUnavailable { .. } => ErrorReason::TrainingBackendUnavailable,
            Self::Failed { .. } => ErrorReason::GenerationFailed,
            Self::TimedOut { .. } => ErrorReason::TrainingTimedOut,
        }
    }
}
