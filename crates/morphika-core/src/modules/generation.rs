//! Image generation from trained models.
//!
//! A prediction is created once, with retries on transient failures, and then
//! polled until it finishes or the polling budget runs out. Only a model whose
//! training succeeded and produced weights can generate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use morphika_types::error::GenerationError;
use morphika_types::models::{
    GenerationConfig, GenerationRequest, GenerationResult, ModelKey, TrainingPhase, TrainingState,
    UserId,
};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::models::ModelRegistry;
use super::retry::{retry_transient, RetryPolicy};
use crate::collaborators::ImageGenerator;

const MAX_PROMPT_CHARS: usize = 1000;

pub struct GenerationService {
    models: Arc<ModelRegistry>,
    backend: Arc<dyn ImageGenerator>,
    config: GenerationConfig,
    retry: RetryPolicy,
}

impl GenerationService {
    pub fn new(
        models: Arc<ModelRegistry>,
        backend: Arc<dyn ImageGenerator>,
        config: GenerationConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self { models, backend, config, retry }
    }

    fn request_for(
        &self,
        weights: String,
        prompt: Option<String>,
        num_outputs: Option<u32>,
    ) -> Result<GenerationRequest, GenerationError> {
        let prompt = match prompt.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => self.config.default_prompt.clone(),
        };
        if prompt.chars().count() > MAX_PROMPT_CHARS {
            return Err(GenerationError::InvalidRequest {
                message: format!("prompt is longer than {} characters", MAX_PROMPT_CHARS),
            });
        }

        let num_outputs = num_outputs.unwrap_or(self.config.default_outputs);
        if num_outputs == 0 || num_outputs > self.config.max_outputs {
            return Err(GenerationError::InvalidRequest {
                message: format!("num_outputs must be between 1 and {}", self.config.max_outputs),
            });
        }
        Ok(GenerationRequest { weights, prompt, num_outputs })
    }

    /// Generate images from the user's trained model.
    ///
    /// A blank or missing prompt uses the configured default prompt.
    pub async fn generate(
        &self,
        user_id: &UserId,
        model_name: &str,
        prompt: Option<String>,
        num_outputs: Option<u32>,
    ) -> Result<GenerationResult, GenerationError> {
        let key = ModelKey::new(user_id.clone(), model_name);
        let model = self
            .models
            .get(&key)
            .ok_or_else(|| GenerationError::ModelNotFound { model_name: model_name.to_string() })?;
        let weights = match (model.training_state, model.artifact_url) {
            (TrainingState::Succeeded, Some(weights)) => weights,
            _ => return Err(GenerationError::NotTrained { model_name: model_name.to_string() }),
        };
        let request = self.request_for(weights, prompt, num_outputs)?;

        let prediction_id =
            retry_transient(&self.retry, "generation.create", || self.backend.create_prediction(&request))
                .await
                .map_err(|e| {
                    if e.is_transient() {
                        GenerationError::BackendUnavailable { message: e.to_string() }
                    } else {
                        GenerationError::Failed { message: e.to_string() }
                    }
                })?;
        info!(
            "[Generation] Prediction {} started for {} ({} outputs)",
            prediction_id, key, request.num_outputs
        );

        let images = self.wait_for(&prediction_id).await?;
        info!("[Generation] Prediction {} returned {} images", prediction_id, images.len());
        Ok(GenerationResult {
            model_name: model.name,
            prediction_id,
            prompt: request.prompt,
            images,
            created_at: Utc::now(),
        })
    }

    async fn wait_for(&self, prediction_id: &str) -> Result<Vec<String>, GenerationError> {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        for poll in 0..self.config.max_polls {
            if poll > 0 {
                sleep(interval).await;
            }

            let status = match retry_transient(&self.retry, "generation.status", || {
                self.backend.get_prediction(prediction_id)
            })
            .await
            {
                Ok(status) => status,
                Err(e) if e.is_transient() => {
                    warn!("[Generation] Status of {} unavailable: {}", prediction_id, e);
                    continue;
                },
                Err(e) => return Err(GenerationError::Failed { message: e.to_string() }),
            };

            match status.phase {
                TrainingPhase::Succeeded => return Ok(status.images),
                TrainingPhase::Failed => {
                    let message = status.error.unwrap_or_else(|| "prediction failed".to_string());
                    return Err(GenerationError::Failed { message });
                },
                TrainingPhase::Canceled => {
                    return Err(GenerationError::Failed { message: "prediction canceled".to_string() });
                },
                TrainingPhase::Starting | TrainingPhase::Processing => {
                    debug!("[Generation] Prediction {} still running", prediction_id);
                },
            }
        }
        warn!("[Generation] Gave up on prediction {}", prediction_id);
        Err(GenerationError::TimedOut { prediction_id: prediction_id.to_string() })
    }
}
