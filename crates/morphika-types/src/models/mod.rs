//! Core domain models for Morphika.
//!
//! This module contains all shared data structures used across the Morphika crates.

mod account;
mod asset;
mod billing;
pub mod config;
mod generation;
mod model;
mod plan;
mod training;

// Re-export all models
pub use account::{ResourceCounts, UsageSnapshot, UserAccount, UserId};
pub use asset::{is_image_file, model_prefix, storage_path, ImageAsset, ALLOWED_IMAGE_EXTENSIONS};
pub use config::{
    AppConfig, BillingConfig, GenerationConfig, LoggingConfig, ReplicateConfig, RetryConfig,
    ServerConfig, SupabaseConfig, TrainingConfig,
};
pub use generation::{GenerationRequest, GenerationResult, PredictionStatus};
pub use model::{AssetRef, Model, ModelKey};
pub use billing::BillingEvent;
pub use plan::{PlanEntry, PlanTier, Resource, ResourceLimits};
pub use training::{
    BackendStatus, TrainingJob, TrainingParams, TrainingPhase, TrainingRequest, TrainingState,
    MAX_TRAINING_IMAGES, MIN_TRAINING_IMAGES,
};
