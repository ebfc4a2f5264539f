//! Replicate training and generation backend.
//!
//! Submits LoRA fine-tuning runs to a trainer version and reads their status
//! back from `/v1/trainings/{id}`. Webhook deliveries carry the same training
//! object, see [`TrainingPayload`]. Image generation runs as a prediction on
//! `/v1/predictions`.

use async_trait::async_trait;
use morphika_types::error::CollaboratorError;
use morphika_types::models::{
    BackendStatus, GenerationRequest, PredictionStatus, ReplicateConfig, TrainingPhase,
    TrainingRequest,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use super::http::{build_http_client, check_status, read_json, secret_from_env, transport_error};
use super::{ImageGenerator, TrainingBackend};
use crate::error::{AppError, AppResult};

const SERVICE: &str = "replicate";
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Output block of a finished training.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TrainingOutput {
    #[serde(default)]
    pub weights: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

/// Training object as returned by the API and posted to webhooks.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TrainingPayload {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub output: Option<TrainingOutput>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl TrainingPayload {
    pub fn into_status(self) -> Result<BackendStatus, CollaboratorError> {
        let phase = TrainingPhase::from_status(&self.status).ok_or_else(|| {
            CollaboratorError::invalid_response(
                SERVICE,
                format!("unknown training status '{}'", self.status),
            )
        })?;

        let artifact_url = self.output.and_then(|output| output.weights.or(output.version));
        Ok(BackendStatus { phase, artifact_url, error: error_message(self.error) })
    }
}

#[derive(Debug, Deserialize)]
struct CreatedTraining {
    id: String,
}

fn error_message(error: Option<Value>) -> Option<String> {
    match error {
        None | Some(Value::Null) => None,
        Some(Value::String(message)) => Some(message),
        Some(other) => Some(other.to_string()),
    }
}

/// Prediction object returned by `/v1/predictions`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PredictionPayload {
    pub id: String,
    pub status: String,
    /// A list of image URLs, or a single URL for one-output models
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

impl PredictionPayload {
    pub fn into_status(self) -> Result<PredictionStatus, CollaboratorError> {
        let phase = TrainingPhase::from_status(&self.status).ok_or_else(|| {
            CollaboratorError::invalid_response(
                SERVICE,
                format!("unknown prediction status '{}'", self.status),
            )
        })?;

        let images = match self.output {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::String(url)) => vec![url],
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(url) => Ok(url),
                    other => Err(CollaboratorError::invalid_response(
                        SERVICE,
                        format!("unexpected prediction output {}", other),
                    )),
                })
                .collect::<Result<_, _>>()?,
            Some(other) => {
                return Err(CollaboratorError::invalid_response(
                    SERVICE,
                    format!("unexpected prediction output {}", other),
                ))
            },
        };
        Ok(PredictionStatus { phase, images, error: error_message(self.error) })
    }
}

pub struct ReplicateBackend {
    http: reqwest::Client,
    base: Url,
    token: String,
    owner: String,
    model: String,
    version: String,
    destination_owner: String,
    generation_version: String,
}

impl ReplicateBackend {
    pub fn new(config: &ReplicateConfig, token: impl Into<String>) -> AppResult<Self> {
        let base = Url::parse(&config.base_url).map_err(|e| {
            AppError::Config(format!("Invalid Replicate URL '{}': {}", config.base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(AppError::Config(format!("Invalid Replicate URL '{}'", config.base_url)));
        }
        Ok(Self {
            http: build_http_client(REQUEST_TIMEOUT_SECS)?,
            base,
            token: token.into(),
            owner: config.owner.clone(),
            model: config.model.clone(),
            version: config.version.clone(),
            destination_owner: config.destination_owner.clone(),
            generation_version: config.generation_version.clone(),
        })
    }

    /// Build from config, reading the API token from the configured env var.
    pub fn from_config(config: &ReplicateConfig) -> AppResult<Self> {
        let token = secret_from_env(&config.token_env)?;
        Self::new(config, token)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments);
        }
        url
    }

    /// `owner/name` for the published weights. Replicate model names are
    /// lowercase and limited to `[a-z0-9._-]`.
    pub fn destination_for(&self, logical: &str) -> String {
        let slug: String = logical
            .chars()
            .map(|c| match c.to_ascii_lowercase() {
                c @ ('a'..='z' | '0'..='9' | '.' | '_' | '-') => c,
                _ => '-',
            })
            .collect();
        format!("{}/{}", self.destination_owner, slug.trim_matches('-'))
    }

    fn submission_body(&self, request: &TrainingRequest) -> Result<Value, CollaboratorError> {
        let mut input = serde_json::to_value(&request.params)
            .map_err(|e| CollaboratorError::invalid_response(SERVICE, e.to_string()))?;
        if let Value::Object(fields) = &mut input {
            fields.insert("input_images".to_string(), json!(request.images));
        }

        let mut body = json!({
            "destination": self.destination_for(&request.destination),
            "input": input,
        });
        if let (Some(webhook), Value::Object(fields)) = (&request.webhook, &mut body) {
            fields.insert("webhook".to_string(), json!(webhook));
            fields.insert("webhook_events_filter".to_string(), json!(["start", "completed"]));
        }
        Ok(body)
    }

    fn prediction_body(&self, request: &GenerationRequest) -> Value {
        json!({
            "version": self.generation_version,
            "input": {
                "model_id": request.weights,
                "prompt": request.prompt,
                "num_outputs": request.num_outputs,
            },
        })
    }
}

#[async_trait]
impl TrainingBackend for ReplicateBackend {
    async fn submit_training(&self, request: &TrainingRequest) -> Result<String, CollaboratorError> {
        let url = self.endpoint(&[
            "v1",
            "models",
            self.owner.as_str(),
            self.model.as_str(),
            "versions",
            self.version.as_str(),
            "trainings",
        ]);
        let body = self.submission_body(request)?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        let created: CreatedTraining = read_json(SERVICE, response).await?;

        info!(
            "[Replicate] Training {} submitted with {} images",
            created.id,
            request.images.len()
        );
        Ok(created.id)
    }

    async fn get_status(&self, job_id: &str) -> Result<BackendStatus, CollaboratorError> {
        let url = self.endpoint(&["v1", "trainings", job_id]);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CollaboratorError::NotFound {
                service: SERVICE.to_string(),
                what: format!("training {}", job_id),
            });
        }
        let response = check_status(SERVICE, response).await?;
        let payload: TrainingPayload = read_json(SERVICE, response).await?;
        debug!("[Replicate] Training {} is {}", job_id, payload.status);
        payload.into_status()
    }
}

#[async_trait]
impl ImageGenerator for ReplicateBackend {
    async fn create_prediction(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
        let url = self.endpoint(&["v1", "predictions"]);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&self.prediction_body(request))
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;
        let response = check_status(SERVICE, response).await?;
        let created: CreatedTraining = read_json(SERVICE, response).await?;

        info!("[Replicate] Prediction {} created for {} outputs", created.id, request.num_outputs);
        Ok(created.id)
    }

    async fn get_prediction(&self, prediction_id: &str) -> Result<PredictionStatus, CollaboratorError> {
        let url = self.endpoint(&["v1", "predictions", prediction_id]);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| transport_error(SERVICE, e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(CollaboratorError::NotFound {
                service: SERVICE.to_string(),
                what: format!("prediction {}", prediction_id),
            });
        }
        let response = check_status(SERVICE, response).await?;
        let payload: PredictionPayload = read_json(SERVICE, response).await?;
        debug!("[Replicate] Prediction {} is {}", prediction_id, payload.status);
        payload.into_status()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn backend() -> ReplicateBackend {
        ReplicateBackend::new(&ReplicateConfig::default(), "r8_test").unwrap()
    }

    #[test]
    fn test_destination_slug() {
        assert_eq!(backend().destination_for("user-1/My Cats"), "morphika/user-1-my-cats");
    }

    #[test]
    fn test_payload_prefers_weights() {
        let payload: TrainingPayload = serde_json::from_value(json!({
            "id": "t1",
            "status": "succeeded",
            "output": { "weights": "https://w/1.tar", "version": "owner/m:abc" },
        }))
        .unwrap();
        let status = payload.into_status().unwrap();
        assert_eq!(status.phase, TrainingPhase::Succeeded);
        assert_eq!(status.artifact_url.as_deref(), Some("https://w/1.tar"));
    }

    #[test]
    fn test_payload_unknown_status() {
        let payload: TrainingPayload =
            serde_json::from_value(json!({ "id": "t1", "status": "exploded" })).unwrap();
        assert!(matches!(payload.into_status(), Err(CollaboratorError::InvalidResponse { .. })));
    }

    #[test]
    fn test_prediction_output_shapes() {
        let many: PredictionPayload = serde_json::from_value(json!({
            "id": "p1",
            "status": "succeeded",
            "output": ["https://out/0.png", "https://out/1.png"],
        }))
        .unwrap();
        assert_eq!(many.into_status().unwrap().images.len(), 2);

        let single: PredictionPayload = serde_json::from_value(json!({
            "id": "p2",
            "status": "succeeded",
            "output": "https://out/only.png",
        }))
        .unwrap();
        assert_eq!(single.into_status().unwrap().images, vec!["https://out/only.png".to_string()]);

        let running: PredictionPayload =
            serde_json::from_value(json!({ "id": "p3", "status": "processing", "output": null }))
                .unwrap();
        let status = running.into_status().unwrap();
        assert_eq!(status.phase, TrainingPhase::Processing);
        assert!(status.images.is_empty());

        let odd: PredictionPayload =
            serde_json::from_value(json!({ "id": "p4", "status": "succeeded", "output": 7 }))
                .unwrap();
        assert!(matches!(odd.into_status(), Err(CollaboratorError::InvalidResponse { .. })));
    }

    #[test]
    fn test_prediction_body_targets_weights() {
        let request = GenerationRequest {
            weights: "https://w/1.tar".to_string(),
            prompt: "a red chair".to_string(),
            num_outputs: 2,
        };
        let body = backend().prediction_body(&request);
        assert_eq!(body["version"], "flux-dev-image-generation");
        assert_eq!(body["input"]["model_id"], "https://w/1.tar");
        assert_eq!(body["input"]["prompt"], "a red chair");
        assert_eq!(body["input"]["num_outputs"], 2);
    }

    #[test]
    fn test_submission_body_carries_images_and_webhook() {
        let request = TrainingRequest {
            images: vec!["https://img/1.png".to_string()],
            destination: "u1/cats".to_string(),
            params: Default::default(),
            webhook: Some("https://studio/api/webhooks/training".to_string()),
        };
        let body = backend().submission_body(&request).unwrap();
        assert_eq!(body["destination"], "morphika/u1-cats");
        assert_eq!(body["input"]["input_images"][0], "https://img/1.png");
        assert_eq!(body["input"]["steps"], 1000);
        assert_eq!(body["webhook_events_filter"][1], "completed");
    }
}
