//! Typed error definitions for Morphika.
//!
//! This module provides a structured error hierarchy with specific error types
//! for different domains. All errors are designed to be:
//!
//! - **Serializable** for API responses via serde
//! - **Displayable** for logging via Display trait
//! - **Matchable** for error handling logic via enum variants
//! - **Classifiable** via [`ErrorReason`], so callers can tell "upgrade your plan"
//!   apart from "try again later"

mod asset;
mod auth;
mod collaborator;
mod generation;
mod model;
mod quota;
mod training;

pub use asset::AssetError;
pub use auth::AuthError;
pub use collaborator::CollaboratorError;
pub use generation::GenerationError;
pub use model::ModelError;
pub use quota::QuotaError;
pub use training::TrainingError;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable, user-facing failure reason.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    QuotaExceeded,
    DuplicateModel,
    DuplicateAsset,
    InsufficientAssets,
    TrainingInProgress,
    StorageUnavailable,
    TrainingBackendUnavailable,
    TrainingTimedOut,
    ModelNotTrained,
    GenerationFailed,
    Unauthenticated,
    NotFound,
    InvalidInput,
    Internal,
}

impl ErrorReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::QuotaExceeded => "quota_exceeded",
            Self::DuplicateModel => "duplicate_model",
            Self::DuplicateAsset => "duplicate_asset",
            Self::InsufficientAssets => "insufficient_assets",
            Self::TrainingInProgress => "training_in_progress",
            Self::StorageUnavailable => "storage_unavailable",
            Self::TrainingBackendUnavailable => "training_backend_unavailable",
            Self::TrainingTimedOut => "training_timed_out",
            Self::ModelNotTrained => "model_not_trained",
            Self::GenerationFailed => "generation_failed",
            Self::Unauthenticated => "unauthenticated",
            Self::NotFound => "not_found",
            Self::InvalidInput => "invalid_input",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type that wraps all domain-specific errors.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "domain", content = "error")]
pub enum TypedError {
    /// Wraps a quota ledger error
    #[error("Quota error: {0}")]
    Quota(#[from] QuotaError),

    /// Wraps an asset registry error
    #[error("Asset error: {0}")]
    Asset(#[from] AssetError),

    /// Wraps a model registry error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Wraps a training orchestrator error
    #[error("Training error: {0}")]
    Training(#[from] TrainingError),

    /// Wraps an image generation error
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Wraps an authentication error
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

impl TypedError {
    pub fn reason(&self) -> ErrorReason {
        match self {
            Self::Quota(e) => e.reason(),
            Self::Asset(e) => e.reason(),
            Self::Model(e) => e.reason(),
            Self::Training(e) => e.reason(),
            Self::Generation(e) => e.reason(),
            Self::Auth(e) => e.reason(),
        }
    }

    /// Inner error message without the domain prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Quota(e) => e.to_string(),
            Self::Asset(e) => e.to_string(),
            Self::Model(e) => e.to_string(),
            Self::Training(e) => e.to_string(),
            Self::Generation(e) => e.to_string(),
            Self::Auth(e) => e.to_string(),
        }
    }
}

/// Standard Result type using TypedError.
pub type Result<T> = std::result::Result<T, TypedError>;
