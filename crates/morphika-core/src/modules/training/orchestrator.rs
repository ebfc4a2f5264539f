//! Training orchestrator.
//!
//! Submission order: claim the model (atomic readiness check), reserve one
//! training unit, call the backend. A failed backend call reverts the claim and
//! returns the unit; a backend-side failure later on does not, since the
//! attempt was made.
//!
//! Status flows in from polling and from backend callbacks. Both go through
//! [`TrainingOrchestrator::apply_status`], which only lets a job move forward.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use morphika_types::error::TrainingError;
use morphika_types::models::{
    BackendStatus, ModelKey, Resource, TrainingConfig, TrainingJob, TrainingRequest,
    TrainingState, UserId,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::collaborators::TrainingBackend;
use crate::modules::models::ModelRegistry;
use crate::modules::quota::QuotaLedger;
use crate::modules::repository::StateRepository;
use crate::modules::retry::{retry_transient, RetryPolicy};

pub struct TrainingOrchestrator {
    jobs: DashMap<String, TrainingJob>,
    models: Arc<ModelRegistry>,
    ledger: Arc<QuotaLedger>,
    backend: Arc<dyn TrainingBackend>,
    config: TrainingConfig,
    retry: RetryPolicy,
    webhook_url: Option<String>,
    repository: Option<Arc<dyn StateRepository>>,
    persist_lock: Mutex<()>,
}

/// Default trigger word: the model name, uppercased, spaces as underscores.
fn trigger_word_for(model_name: &str) -> String {
    model_name.trim().replace(' ', "_").to_uppercase()
}

impl TrainingOrchestrator {
    pub fn new(
        models: Arc<ModelRegistry>,
        ledger: Arc<QuotaLedger>,
        backend: Arc<dyn TrainingBackend>,
        config: TrainingConfig,
        retry: RetryPolicy,
        repository: Option<Arc<dyn StateRepository>>,
    ) -> Self {
        Self {
            jobs: DashMap::new(),
            models,
            ledger,
            backend,
            config,
            retry,
            webhook_url: None,
            repository,
            persist_lock: Mutex::new(()),
        }
    }

    /// Ask the backend to report status changes to `url`.
    pub fn with_webhook_url(mut self, url: Option<String>) -> Self {
        self.webhook_url = url;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Replace in-memory state with previously persisted jobs.
    pub fn restore(&self, jobs: Vec<TrainingJob>) {
        self.jobs.clear();
        for job in jobs {
            self.jobs.insert(job.job_id.clone(), job);
        }
    }

    /// Raw job record, including timed-out jobs.
    pub fn get(&self, job_id: &str) -> Option<TrainingJob> {
        self.jobs.get(job_id).map(|job| job.clone())
    }

    /// Job record; a job that timed out before finishing is reported as `TimedOut`.
    pub fn job(&self, job_id: &str) -> Result<TrainingJob, TrainingError> {
        let job = self
            .get(job_id)
            .ok_or_else(|| TrainingError::JobNotFound { job_id: job_id.to_string() })?;
        if job.timed_out && !job.state.is_terminal() {
            return Err(TrainingError::TimedOut { job_id: job_id.to_string() });
        }
        Ok(job)
    }

    /// The user's jobs, newest first.
    pub fn jobs_for(&self, user_id: &UserId) -> Vec<TrainingJob> {
        let mut jobs: Vec<TrainingJob> = self
            .jobs
            .iter()
            .filter(|entry| &entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        jobs
    }

    /// Jobs the poller still has to look at.
    pub fn watched_jobs(&self) -> Vec<TrainingJob> {
        self.jobs
            .iter()
            .filter(|entry| entry.watched && !entry.state.is_terminal())
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn build_request(&self, key: &ModelKey, images: Vec<String>) -> TrainingRequest {
        let mut params = self.config.params.clone();
        if params.trigger_word.trim().is_empty() {
            params.trigger_word = trigger_word_for(&key.model_name);
        }
        TrainingRequest {
            images,
            destination: format!("{}/{}", key.user_id, key.model_name),
            params,
            webhook: self.webhook_url.clone(),
        }
    }

    /// Start training a model.
    pub async fn submit(
        &self,
        user_id: &UserId,
        model_name: &str,
    ) -> Result<TrainingJob, TrainingError> {
        let key = ModelKey::new(user_id.clone(), model_name);
        let claim =
            self.models.claim_for_training(&key, self.config.min_images, self.config.max_images)?;

        if let Err(e) = self.ledger.reserve(user_id, Resource::Trainings, 1).await {
            self.models.revert_claim(&key, claim.previous);
            return Err(e.into());
        }

        let request = self.build_request(&key, claim.image_urls);
        let submitted =
            retry_transient(&self.retry, "training.submit", || self.backend.submit_training(&request))
                .await;

        let job_id = match submitted {
            Ok(job_id) => job_id,
            Err(e) => {
                self.models.revert_claim(&key, claim.previous);
                self.ledger.release(user_id, Resource::Trainings, 1).await;
                warn!("[Training] Submission for {} failed: {}", key, e);
                return Err(TrainingError::BackendUnavailable { message: e.to_string() });
            },
        };

        let job = TrainingJob::new(job_id.clone(), &key, self.config.poll_interval_secs);
        self.jobs.insert(job_id.clone(), job.clone());
        self.models.bind_job(&key, &job_id).await;
        self.persist(&job_id).await;

        info!(
            "[Training] Submitted job {} for {} with {} images",
            job_id,
            key,
            request.images.len()
        );
        Ok(job)
    }

    /// Query the backend once and apply the result.
    pub async fn poll(&self, job_id: &str) -> Result<TrainingState, TrainingError> {
        let job = self
            .get(job_id)
            .ok_or_else(|| TrainingError::JobNotFound { job_id: job_id.to_string() })?;
        if job.state.is_terminal() {
            return Ok(job.state);
        }

        let status =
            retry_transient(&self.retry, "training.status", || self.backend.get_status(job_id))
                .await;
        match status {
            Ok(status) => self.apply_status(job_id, status).await,
            Err(e) => {
                self.back_off(job_id).await;
                warn!("[Training] Status check for {} failed: {}", job_id, e);
                Err(TrainingError::BackendUnavailable { message: e.to_string() })
            },
        }
    }

    /// Apply a backend status to a job.
    ///
    /// Transitions only move forward; a terminal job never changes again.
    /// Unchanged status doubles the job's poll interval up to the configured
    /// maximum, a change resets it.
    pub async fn apply_status(
        &self,
        job_id: &str,
        status: BackendStatus,
    ) -> Result<TrainingState, TrainingError> {
        let next = status.phase.to_state();
        let now = Utc::now();
        let (state, changed, key, artifact_url) = {
            let mut job = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| TrainingError::JobNotFound { job_id: job_id.to_string() })?;
            job.last_polled_at = Some(now);

            let changed = job.state.accepts(next);
            if changed {
                job.state = next;
                job.poll_interval_secs = self.config.poll_interval_secs;
                match next {
                    TrainingState::Succeeded => {
                        job.artifact_url = status.artifact_url.clone();
                    },
                    TrainingState::Failed => {
                        job.failure_reason =
                            Some(status.error.clone().unwrap_or_else(|| "training failed".into()));
                    },
                    TrainingState::Idle | TrainingState::Queued | TrainingState::Running => {},
                }
            } else if !job.state.is_terminal() {
                job.poll_interval_secs = job
                    .poll_interval_secs
                    .max(1)
                    .saturating_mul(2)
                    .min(self.config.max_poll_interval_secs);
            }

            if job.state.is_terminal() {
                job.watched = false;
                job.next_poll_at = None;
            } else {
                job.next_poll_at =
                    Some(now + ChronoDuration::seconds(job.poll_interval_secs as i64));
            }
            (job.state, changed, job.value().key(), job.artifact_url.clone())
        };

        if changed {
            if state.is_terminal() {
                if state == TrainingState::Succeeded && artifact_url.is_none() {
                    warn!("[Training] Job {} succeeded without an artifact", job_id);
                }
                self.models.finish_training(&key, job_id, state, artifact_url).await;
            } else {
                self.models.record_job_state(&key, job_id, state).await;
            }
            info!("[Training] Job {} for {} is now {}", job_id, key, state);
        } else {
            debug!("[Training] Job {} unchanged at {}", job_id, state);
        }
        self.persist(job_id).await;
        Ok(state)
    }

    /// Stop polling a job. Its state stays as last observed.
    pub async fn stop_watching(&self, job_id: &str) -> Result<TrainingJob, TrainingError> {
        let job = {
            let mut job = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| TrainingError::JobNotFound { job_id: job_id.to_string() })?;
            job.watched = false;
            job.next_poll_at = None;
            job.clone()
        };
        self.persist(job_id).await;
        info!("[Training] Stopped watching job {}", job_id);
        Ok(job)
    }

    /// Give up polling a job that has been running for too long.
    pub async fn mark_timed_out(&self, job_id: &str) {
        let marked = match self.jobs.get_mut(job_id) {
            Some(mut job) if !job.state.is_terminal() => {
                job.timed_out = true;
                job.watched = false;
                job.next_poll_at = None;
                true
            },
            _ => false,
        };
        if marked {
            self.persist(job_id).await;
            warn!("[Training] Job {} timed out; it may still finish remotely", job_id);
        }
    }

    async fn back_off(&self, job_id: &str) {
        let updated = match self.jobs.get_mut(job_id) {
            Some(mut job) if !job.state.is_terminal() => {
                job.poll_interval_secs = job
                    .poll_interval_secs
                    .max(1)
                    .saturating_mul(2)
                    .min(self.config.max_poll_interval_secs);
                job.next_poll_at =
                    Some(Utc::now() + ChronoDuration::seconds(job.poll_interval_secs as i64));
                true
            },
            _ => false,
        };
        if updated {
            self.persist(job_id).await;
        }
    }

    async fn persist(&self, job_id: &str) {
        let Some(repository) = &self.repository else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        let Some(job) = self.get(job_id) else {
            return;
        };
        if let Err(e) = repository.save_job(&job).await {
            error!("[Training] Failed to persist job {}: {}", job_id, e);
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod orchestrator_tests;
