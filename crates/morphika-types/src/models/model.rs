//! Trainable model records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::UserId;
use super::training::TrainingState;

/// Identity of a model: unique per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub user_id: UserId,
    pub model_name: String,
}

impl ModelKey {
    pub fn new(user_id: UserId, model_name: impl Into<String>) -> Self {
        Self { user_id, model_name: model_name.into() }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.model_name)
    }
}

/// Reference from a model to an asset owned by the asset registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetRef {
    pub file_name: String,
    pub url: String,
}

/// A named collection of training images plus its training outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Model {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Upload order; display only
    #[serde(default)]
    pub assets: Vec<AssetRef>,
    #[serde(default)]
    pub training_state: TrainingState,
    /// Current or most recent training job
    #[serde(default)]
    pub job_id: Option<String>,
    /// Trained weights locator
    #[serde(default)]
    pub artifact_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn new(user_id: UserId, name: impl Into<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            name: name.into(),
            description,
            assets: Vec::new(),
            training_state: TrainingState::Idle,
            job_id: None,
            artifact_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.user_id.clone(), self.name.clone())
    }

    pub fn asset_urls(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.url.clone()).collect()
    }
}
