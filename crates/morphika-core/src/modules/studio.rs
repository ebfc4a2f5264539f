//! Studio facade: the operations the HTTP API exposes.
//!
//! Wires the ledger, registries and orchestrator to one set of collaborators
//! and adds what spans them: resolving the caller, opening accounts on the
//! billing plan, keeping model asset lists in step with the asset registry,
//! and job ownership checks.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use morphika_types::error::{AssetError, AuthError, ModelError, TrainingError};
use morphika_types::models::{
    AppConfig, BillingEvent, GenerationResult, ImageAsset, Model, ModelKey, PlanEntry, PlanTier, TrainingJob,
    TrainingState, UsageSnapshot, UserId,
};
use morphika_types::Result;
use serde::Serialize;
use tracing::{error, info, warn};

use super::assets::{AssetRegistry, ReconcileReport};
use super::generation::GenerationService;
use super::models::ModelRegistry;
use super::plan_catalog;
use super::quota::QuotaLedger;
use super::repository::{RepositoryError, StateRepository};
use super::retry::{retry_transient, RetryPolicy};
use super::training::TrainingOrchestrator;
use crate::collaborators::{BillingProvider, Collaborators, IdentityProvider};

/// Records loaded by [`Studio::restore`].
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RestoreReport {
    pub accounts: usize,
    pub models: usize,
    pub assets: usize,
    pub jobs: usize,
}

/// Live counts for health output.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct StudioStats {
    pub accounts: usize,
    pub models: usize,
    pub assets: usize,
    pub watched_jobs: usize,
}

pub struct Studio {
    identity: Arc<dyn IdentityProvider>,
    billing: Arc<dyn BillingProvider>,
    ledger: Arc<QuotaLedger>,
    assets: Arc<AssetRegistry>,
    models: Arc<ModelRegistry>,
    training: Arc<TrainingOrchestrator>,
    generation: GenerationService,
    repository: Option<Arc<dyn StateRepository>>,
    default_tier: PlanTier,
    retry: RetryPolicy,
}

impl Studio {
    pub fn new(
        collaborators: Collaborators,
        config: &AppConfig,
        repository: Option<Arc<dyn StateRepository>>,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        let ledger = Arc::new(QuotaLedger::new(repository.clone()));
        let assets = Arc::new(AssetRegistry::new(
            collaborators.storage,
            ledger.clone(),
            retry.clone(),
            repository.clone(),
        ));
        let models = Arc::new(ModelRegistry::new(ledger.clone(), assets.clone(), repository.clone()));

        let webhook_url = config
            .server
            .public_url
            .as_deref()
            .map(|base| format!("{}/api/webhooks/training", base.trim_end_matches('/')));
        let training = Arc::new(
            TrainingOrchestrator::new(
                models.clone(),
                ledger.clone(),
                collaborators.training,
                config.training.clone(),
                retry.clone(),
                repository.clone(),
            )
            .with_webhook_url(webhook_url),
        );
        let generation = GenerationService::new(
            models.clone(),
            collaborators.generator,
            config.generation.clone(),
            retry.clone(),
        );

        Self {
            identity: collaborators.identity,
            billing: collaborators.billing,
            ledger,
            assets,
            models,
            training,
            generation,
            repository,
            default_tier: config.billing.default_tier,
            retry,
        }
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    pub fn assets(&self) -> &Arc<AssetRegistry> {
        &self.assets
    }

    pub fn models(&self) -> &Arc<ModelRegistry> {
        &self.models
    }

    pub fn training(&self) -> &Arc<TrainingOrchestrator> {
        &self.training
    }

    pub fn stats(&self) -> StudioStats {
        StudioStats {
            accounts: self.ledger.account_count(),
            models: self.models.model_count(),
            assets: self.assets.total_count(),
            watched_jobs: self.training.watched_jobs().len(),
        }
    }

    /// Load persisted state. Model asset lists are rebuilt from the asset
    /// records so that both always agree after a restart.
    pub async fn restore(&self) -> std::result::Result<RestoreReport, RepositoryError> {
        let Some(repository) = &self.repository else {
            return Ok(RestoreReport::default());
        };

        let accounts = repository.load_accounts().await?;
        let mut models = repository.load_models().await?;
        let assets = repository.load_assets().await?;
        let jobs = repository.load_jobs().await?;

        let mut by_model: HashMap<ModelKey, Vec<&ImageAsset>> = HashMap::new();
        for asset in &assets {
            by_model.entry(asset.key()).or_default().push(asset);
        }
        for model in &mut models {
            let mut owned = by_model.remove(&model.key()).unwrap_or_default();
            owned.sort_by_key(|asset| asset.uploaded_at);
            model.assets = owned.iter().map(|asset| asset.to_ref()).collect();
        }
        if !by_model.is_empty() {
            warn!("[Studio] {} asset lists have no owning model", by_model.len());
        }

        let report = RestoreReport {
            accounts: accounts.len(),
            models: models.len(),
            assets: assets.len(),
            jobs: jobs.len(),
        };
        self.ledger.restore(accounts);
        self.assets.restore(assets);
        self.models.restore(models);
        self.training.restore(jobs);

        info!(
            "[Studio] Restored {} accounts, {} models, {} assets, {} jobs",
            report.accounts, report.models, report.assets, report.jobs
        );
        Ok(report)
    }

    /// Resolve the caller from a bearer token.
    pub async fn authenticate(&self, access_token: Option<&str>) -> Result<UserId> {
        let token = access_token.map(str::trim).filter(|t| !t.is_empty());
        let Some(token) = token else {
            return Err(AuthError::Unauthenticated.into());
        };
        Ok(self.identity.current_user(token).await?)
    }

    /// Open the user's account on their billing plan if it does not exist yet.
    ///
    /// A billing lookup that fails after retries falls back to the default tier;
    /// a later `TierChanged` event corrects it.
    pub async fn ensure_account(&self, user_id: &UserId) -> UsageSnapshot {
        if let Ok(usage) = self.ledger.usage(user_id).await {
            return usage;
        }

        let plan =
            retry_transient(&self.retry, "billing.plan", || self.billing.plan_for(user_id)).await;
        let tier = match plan {
            Ok(Some(tier)) => tier,
            Ok(None) => self.default_tier,
            Err(e) => {
                warn!(
                    "[Studio] Billing lookup for {} failed, using {}: {}",
                    user_id, self.default_tier, e
                );
                self.default_tier
            },
        };
        self.ledger.open_account(user_id, tier).await
    }

    pub fn plans(&self) -> Vec<PlanEntry> {
        plan_catalog::catalog()
    }

    pub async fn usage(&self, user_id: &UserId) -> UsageSnapshot {
        self.ensure_account(user_id).await
    }

    pub async fn create_model(
        &self,
        user_id: &UserId,
        name: &str,
        description: Option<String>,
    ) -> Result<Model> {
        self.ensure_account(user_id).await;
        Ok(self.models.create(user_id, name, description).await?)
    }

    pub fn list_models(&self, user_id: &UserId) -> Vec<Model> {
        self.models.list(user_id)
    }

    pub fn get_model(&self, user_id: &UserId, name: &str) -> Result<Model> {
        self.models
            .get(&ModelKey::new(user_id.clone(), name))
            .ok_or_else(|| ModelError::NotFound { name: name.to_string() }.into())
    }

    pub async fn delete_model(&self, user_id: &UserId, name: &str) -> Result<()> {
        Ok(self.models.delete(user_id, name).await?)
    }

    fn require_model(&self, user_id: &UserId, model_name: &str) -> Result<ModelKey> {
        let key = ModelKey::new(user_id.clone(), model_name);
        if !self.models.exists(&key) {
            return Err(AssetError::ModelNotFound { model_name: model_name.to_string() }.into());
        }
        Ok(key)
    }

    /// Like `require_model`, but refuses while a training job is reading the model's images.
    fn require_settled_model(&self, user_id: &UserId, model_name: &str) -> Result<ModelKey> {
        let key = ModelKey::new(user_id.clone(), model_name);
        match self.models.get(&key) {
            None => Err(AssetError::ModelNotFound { model_name: model_name.to_string() }.into()),
            Some(model) if model.training_state.is_in_flight() => {
                Err(ModelError::TrainingInProgress { name: model_name.to_string() }.into())
            },
            Some(_) => Ok(key),
        }
    }

    /// Upload an image into a model and record it on the model.
    pub async fn upload_asset(
        &self,
        user_id: &UserId,
        model_name: &str,
        file_name: &str,
        bytes: Bytes,
        overwrite: bool,
    ) -> Result<ImageAsset> {
        self.ensure_account(user_id).await;
        let key = self.require_settled_model(user_id, model_name)?;
        let asset = self.assets.upload(user_id, model_name, file_name, bytes, overwrite).await?;

        if self.models.attach_asset(&key, asset.to_ref()).await.is_err() {
            warn!("[Studio] {} vanished during upload of {}, rolling back", key, file_name);
            if let Err(e) = self.assets.delete(user_id, model_name, file_name).await {
                error!("[Studio] Rollback of {}/{} failed: {}", key, file_name, e);
            }
            return Err(AssetError::ModelNotFound { model_name: model_name.to_string() }.into());
        }
        Ok(asset)
    }

    pub fn list_assets(&self, user_id: &UserId, model_name: &str) -> Result<Vec<ImageAsset>> {
        self.require_model(user_id, model_name)?;
        Ok(self.assets.list(user_id, model_name))
    }

    pub async fn delete_asset(
        &self,
        user_id: &UserId,
        model_name: &str,
        file_name: &str,
    ) -> Result<ImageAsset> {
        let key = self.require_settled_model(user_id, model_name)?;
        let asset = self.assets.delete(user_id, model_name, file_name).await?;
        if let Err(e) = self.models.detach_asset(&key, file_name).await {
            warn!("[Studio] Could not detach {} from {}: {}", file_name, key, e);
        }
        Ok(asset)
    }

    /// Adopt images already present in storage for this model.
    pub async fn sync_assets(&self, user_id: &UserId, model_name: &str) -> Result<ReconcileReport> {
        self.ensure_account(user_id).await;
        let key = self.require_settled_model(user_id, model_name)?;
        let report = self.assets.reconcile(user_id, model_name).await?;
        for asset in &report.imported {
            if let Err(e) = self.models.attach_asset(&key, asset.to_ref()).await {
                warn!("[Studio] Could not attach {} to {}: {}", asset.file_name, key, e);
            }
        }
        Ok(report)
    }

    pub async fn submit_training(&self, user_id: &UserId, model_name: &str) -> Result<TrainingJob> {
        self.ensure_account(user_id).await;
        Ok(self.training.submit(user_id, model_name).await?)
    }

    fn owned_job(&self, user_id: &UserId, job_id: &str) -> Result<TrainingJob> {
        self.training
            .get(job_id)
            .filter(|job| &job.user_id == user_id)
            .ok_or_else(|| TrainingError::JobNotFound { job_id: job_id.to_string() }.into())
    }

    pub fn list_jobs(&self, user_id: &UserId) -> Vec<TrainingJob> {
        self.training.jobs_for(user_id)
    }

    /// Job status; reports `TimedOut` for jobs the poller gave up on.
    pub fn training_job(&self, user_id: &UserId, job_id: &str) -> Result<TrainingJob> {
        self.owned_job(user_id, job_id)?;
        Ok(self.training.job(job_id)?)
    }

    /// Query the backend now, also for timed-out or unwatched jobs.
    pub async fn poll_training(&self, user_id: &UserId, job_id: &str) -> Result<TrainingJob> {
        self.owned_job(user_id, job_id)?;
        self.training.poll(job_id).await?;
        self.owned_job(user_id, job_id)
    }

    pub async fn stop_watching(&self, user_id: &UserId, job_id: &str) -> Result<TrainingJob> {
        self.owned_job(user_id, job_id)?;
        Ok(self.training.stop_watching(job_id).await?)
    }

    /// Backend notification that a job changed. The status is re-read from
    /// the backend rather than taken from the notification body.
    pub async fn handle_training_callback(&self, job_id: &str) -> Result<TrainingState> {
        Ok(self.training.poll(job_id).await?)
    }

    /// Generate images from a model whose training succeeded.
    pub async fn generate_images(
        &self,
        user_id: &UserId,
        model_name: &str,
        prompt: Option<String>,
        num_outputs: Option<u32>,
    ) -> Result<GenerationResult> {
        Ok(self.generation.generate(user_id, model_name, prompt, num_outputs).await?)
    }

    pub async fn handle_billing_event(&self, event: BillingEvent) -> Result<UsageSnapshot> {
        match event {
            BillingEvent::TierChanged { user_id, tier } => {
                Ok(self.ledger.set_tier(&user_id, tier).await)
            },
            BillingEvent::PeriodRenewed { user_id } => {
                self.ensure_account(&user_id).await;
                Ok(self.ledger.reset_period(&user_id).await?)
            },
        }
    }
}
