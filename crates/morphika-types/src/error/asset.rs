//! Asset registry errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{ErrorReason, QuotaError};

/// Errors raised while uploading, listing or deleting image assets.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum AssetError {
    /// Asset key already exists and overwrite was not requested
    #[error("Asset {file_name} already exists")]
    Duplicate {
        /// File name of the conflicting asset
        file_name: String,
    },

    /// File extension is not in the image allow-list
    #[error("Unsupported file type: {file_name}")]
    UnsupportedFileType {
        /// Rejected file name
        file_name: String,
    },

    /// File name is empty or contains path separators
    #[error("Invalid file name {file_name:?}")]
    InvalidFileName {
        /// Rejected file name
        file_name: String,
    },

    /// Asset does not exist
    #[error("Asset {file_name} not found")]
    NotFound {
        /// File name that was looked up
        file_name: String,
    },

    /// Owning model does not exist
    #[error("Model {model_name} not found")]
    ModelNotFound {
        /// Model that was looked up
        model_name: String,
    },

    /// Object storage failed after retries
    #[error("Storage unavailable: {message}")]
    StorageUnavailable {
        /// Last storage failure
        message: String,
    },

    /// Photo reservation failed
    #[error(transparent)]
    Quota(#[from] QuotaError),
}

impl AssetError {
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::Duplicate { .. } => ErrorReason::DuplicateAsset,
            Self::UnsupportedFileType { .. } | Self::InvalidFileName { .. } => {
                ErrorReason::InvalidInput
            },
            Self::NotFound { .. } | Self::ModelNotFound { .. } => ErrorReason::NotFound,
            Self::StorageUnavailable { .. } => ErrorReason::StorageUnavailable,
            Self::Quota(e) => e.reason(),
        }
    }
}
