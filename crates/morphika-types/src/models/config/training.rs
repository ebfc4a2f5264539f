//! Training and retry tuning.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::models::{TrainingParams, MAX_TRAINING_IMAGES, MIN_TRAINING_IMAGES};

fn default_min_images() -> usize {
    MIN_TRAINING_IMAGES
}

fn default_max_images() -> usize {
    MAX_TRAINING_IMAGES
}

fn default_poll_interval() -> u64 {
    15
}

fn default_max_poll_interval() -> u64 {
    300
}

fn default_poll_timeout() -> u64 {
    120
}

fn default_sweep_interval() -> u64 {
    10
}

fn validate_image_range(config: &TrainingConfig) -> Result<(), ValidationError> {
    if config.min_images == 0 || config.min_images > config.max_images {
        return Err(ValidationError::new("image_range"));
    }
    if config.poll_interval_secs > config.max_poll_interval_secs {
        return Err(ValidationError::new("poll_interval_range"));
    }
    Ok(())
}

/// Training submission and polling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Validate)]
#[validate(schema(function = "validate_image_range"))]
pub struct TrainingConfig {
    #[serde(default = "default_min_images")]
    pub min_images: usize,
    #[serde(default = "default_max_images")]
    pub max_images: usize,
    /// First delay between polls of a job
    #[validate(range(min = 5_u64, max = 3600_u64))]
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Backoff ceiling for unchanged jobs
    #[validate(range(min = 5_u64, max = 86400_u64))]
    #[serde(default = "default_max_poll_interval")]
    pub max_poll_interval_secs: u64,
    /// Give up watching a job after this long
    #[validate(range(min = 1_u64, max = 10080_u64))]
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_minutes: u64,
    /// Poller wake-up period
    #[validate(range(min = 1_u64, max = 3600_u64))]
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub params: TrainingParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_images: default_min_images(),
            max_images: default_max_images(),
            poll_interval_secs: default_poll_interval(),
            max_poll_interval_secs: default_max_poll_interval(),
            poll_timeout_minutes: default_poll_timeout(),
            sweep_interval_secs: default_sweep_interval(),
            params: TrainingParams::default(),
        }
    }
}

fn default_prompt() -> String {
    "A high-quality product photo on a white background.".to_string()
}

fn default_outputs() -> u32 {
    1
}

fn default_max_outputs() -> u32 {
    4
}

fn default_prediction_poll_ms() -> u64 {
    1_000
}

fn default_prediction_max_polls() -> u32 {
    120
}

fn validate_output_range(config: &GenerationConfig) -> Result<(), ValidationError> {
    if config.default_outputs == 0 || config.default_outputs > config.max_outputs {
        return Err(ValidationError::new("output_range"));
    }
    Ok(())
}

/// Image generation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[validate(schema(function = "validate_output_range"))]
pub struct GenerationConfig {
    /// Prompt used when the request carries none
    #[serde(default = "default_prompt")]
    pub default_prompt: String,
    #[serde(default = "default_outputs")]
    pub default_outputs: u32,
    #[validate(range(min = 1_u32, max = 8_u32))]
    #[serde(default = "default_max_outputs")]
    pub max_outputs: u32,
    /// Delay between prediction status checks
    #[validate(range(min = 1_u64, max = 60_000_u64))]
    #[serde(default = "default_prediction_poll_ms")]
    pub poll_interval_ms: u64,
    /// Status checks before giving up on a prediction
    #[validate(range(min = 1_u32, max = 10_000_u32))]
    #[serde(default = "default_prediction_max_polls")]
    pub max_polls: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            default_prompt: default_prompt(),
            default_outputs: default_outputs(),
            max_outputs: default_max_outputs(),
            poll_interval_ms: default_prediction_poll_ms(),
            max_polls: default_prediction_max_polls(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    10_000
}

/// Bounded retry for transient collaborator failures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct RetryConfig {
    /// Attempts including the first call
    #[validate(range(min = 1_u32, max = 10_u32))]
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}
