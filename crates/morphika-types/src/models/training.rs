//! Training job models and the training state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::UserId;
use super::model::ModelKey;

/// Fewest images a model needs before training can be requested.
pub const MIN_TRAINING_IMAGES: usize = 8;
/// Most images a single training run accepts.
pub const MAX_TRAINING_IMAGES: usize = 15;

/// Lifecycle of a model's training.
///
/// `Idle → Queued → Running → {Succeeded, Failed}`. Terminal states only move
/// again through a fresh submission, which starts a new job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrainingState {
    #[default]
    Idle,
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TrainingState {
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Queued => 1,
            Self::Running => 2,
            Self::Succeeded | Self::Failed => 3,
        }
    }

    /// Whether a job currently in `self` may move to `next`.
    ///
    /// Transitions only move forward and never leave a terminal state.
    pub const fn accepts(&self, next: TrainingState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TrainingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Phase reported by the training backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPhase {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl TrainingPhase {
    /// Parse a backend status string ("starting", "processing", ...).
    pub fn from_status(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "starting" | "queued" => Some(Self::Starting),
            "processing" | "running" => Some(Self::Processing),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub const fn to_state(self) -> TrainingState {
        match self {
            Self::Starting => TrainingState::Queued,
            Self::Processing => TrainingState::Running,
            Self::Succeeded => TrainingState::Succeeded,
            Self::Failed | Self::Canceled => TrainingState::Failed,
        }
    }
}

/// Status snapshot returned by the training backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackendStatus {
    pub phase: TrainingPhase,
    #[serde(default)]
    pub artifact_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl BackendStatus {
    pub fn new(phase: TrainingPhase) -> Self {
        Self { phase, artifact_url: None, error: None }
    }
}

/// Trainer hyper-parameters sent with every submission.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingParams {
    pub steps: u32,
    pub lora_rank: u32,
    pub optimizer: String,
    pub batch_size: u32,
    pub resolution: String,
    pub autocaption: bool,
    /// Filled from the model name when empty
    #[serde(default)]
    pub trigger_word: String,
    pub learning_rate: f64,
    pub caption_dropout_rate: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            steps: 1000,
            lora_rank: 16,
            optimizer: "adamw8bit".to_string(),
            batch_size: 1,
            resolution: "512,768,1024".to_string(),
            autocaption: true,
            trigger_word: String::new(),
            learning_rate: 0.0004,
            caption_dropout_rate: 0.05,
        }
    }
}

/// Request handed to the training backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingRequest {
    /// Public image URLs
    pub images: Vec<String>,
    /// Where the backend publishes the trained weights
    pub destination: String,
    pub params: TrainingParams,
    /// Callback URL for status notifications
    #[serde(default)]
    pub webhook: Option<String>,
}

fn default_watched() -> bool {
    true
}

/// An asynchronous training run tracked by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrainingJob {
    /// Identifier issued by the training backend
    pub job_id: String,
    pub user_id: UserId,
    pub model_name: String,
    pub state: TrainingState,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub last_polled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub artifact_url: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// Whether the poller still sweeps this job
    #[serde(default = "default_watched")]
    pub watched: bool,
    /// Polling gave up before a terminal state was observed
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub next_poll_at: Option<DateTime<Utc>>,
}

impl TrainingJob {
    pub fn new(job_id: String, key: &ModelKey, poll_interval_secs: u64) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            user_id: key.user_id.clone(),
            model_name: key.model_name.clone(),
            state: TrainingState::Queued,
            submitted_at: now,
            last_polled_at: None,
            artifact_url: None,
            failure_reason: None,
            watched: true,
            timed_out: false,
            poll_interval_secs,
            next_poll_at: Some(now + chrono::Duration::seconds(poll_interval_secs as i64)),
        }
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.user_id.clone(), self.model_name.clone())
    }
}
