//! Quota ledger errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ErrorReason;
use crate::models::Resource;

/// Errors raised by the quota ledger.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum QuotaError {
    /// Reservation would push the counter past the plan limit
    #[error("{resource} quota exceeded: {consumed}/{limit} used, {requested} requested")]
    Exceeded {
        /// Resource being reserved
        resource: Resource,
        /// Units asked for
        requested: u32,
        /// Units already consumed
        consumed: u32,
        /// Plan limit for the resource
        limit: u32,
    },

    /// No ledger account exists for the user
    #[error("No quota account for user {user_id}")]
    AccountNotFound {
        /// Identifier of the unknown user
        user_id: String,
    },
}

impl QuotaError {
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::Exceeded { .. } => ErrorReason::QuotaExceeded,
            Self::AccountNotFound { .. } => ErrorReason::NotFound,
        }
    }
}
