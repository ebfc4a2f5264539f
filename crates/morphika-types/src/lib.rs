//! # Morphika Types
//!
//! Core types, models, and error definitions for the Morphika model studio.
//!
//! - **`error`** - Typed error hierarchy for quota, assets, models, training, generation and auth
//! - **`models`** - Domain models (plans, accounts, assets, models, training jobs, config)
//!
//! ## Architecture Role
//!
//! `morphika-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!        morphika-types (this crate)
//!                │
//!                ▼
//!          morphika-core
//!                │
//!                ▼
//!         morphika-server
//! ```
//!
//! All types are designed to be:
//! - **Serializable** via serde for the HTTP API and the JSON repository
//! - **Clone** for cheap sharing across async boundaries
//! - **PartialEq** for testing and comparison

pub mod error;
pub mod models;

pub use error::{
    AssetError, AuthError, CollaboratorError, ErrorReason, GenerationError, ModelError, QuotaError,
    Result, TrainingError, TypedError,
};

pub use models::{
    AppConfig, AssetRef, BackendStatus, BillingEvent, GenerationRequest, GenerationResult,
    ImageAsset, Model, ModelKey, PlanEntry, PlanTier, PredictionStatus, Resource, ResourceCounts,
    ResourceLimits, TrainingJob, TrainingParams, TrainingPhase, TrainingRequest, TrainingState,
    UsageSnapshot, UserAccount, UserId,
};
