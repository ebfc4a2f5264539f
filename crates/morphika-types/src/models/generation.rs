//! Image generation against trained weights.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::training::TrainingPhase;

/// Prediction request sent to the generation backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Trained weights locator, the model's `artifact_url`
    pub weights: String,
    pub prompt: String,
    pub num_outputs: u32,
}

/// Status of a prediction as reported by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PredictionStatus {
    pub phase: TrainingPhase,
    /// Output image URLs, filled once the prediction succeeded
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl PredictionStatus {
    pub fn new(phase: TrainingPhase) -> Self {
        Self { phase, images: Vec::new(), error: None }
    }

    pub fn succeeded(images: Vec<String>) -> Self {
        Self { phase: TrainingPhase::Succeeded, images, error: None }
    }
}

/// Images generated from a trained model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationResult {
    pub model_name: String,
    pub prediction_id: String,
    pub prompt: String,
    pub images: Vec<String>,
    pub created_at: DateTime<Utc>,
}
