//! Model registry: named models per user and their training state.
//!
//! Every key maps to a slot. `Pending` reserves the name while the model unit
//! is being charged, so a concurrent create of the same name fails with
//! `Duplicate` instead of racing. `Retiring` hides a model from readers while
//! its assets are being removed.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use morphika_types::error::{ModelError, TrainingError};
use morphika_types::models::{AssetRef, Model, ModelKey, Resource, TrainingState, UserId};
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::assets::AssetRegistry;
use super::quota::QuotaLedger;
use super::repository::StateRepository;

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Clone)]
enum Slot {
    Pending,
    Live(Model),
    Retiring,
}

/// Result of a successful training claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingClaim {
    /// State to restore if the submission does not go through
    pub previous: TrainingState,
    /// Asset URLs in upload order
    pub image_urls: Vec<String>,
}

#[allow(clippy::expect_used, reason = "pattern is a compile-time constant")]
fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9 _-]+$").expect("valid model name pattern"))
}

/// Model names are 1-64 characters of letters, digits, space, `-` and `_`,
/// and may not be blank.
pub fn validate_model_name(name: &str) -> Result<(), ModelError> {
    let invalid = |message: &str| ModelError::InvalidName {
        name: name.to_string(),
        message: message.to_string(),
    };
    if name.trim().is_empty() {
        return Err(invalid("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(invalid("name must be at most 64 characters"));
    }
    if !name_pattern().is_match(name) {
        return Err(invalid("only letters, digits, spaces, '-' and '_' are allowed"));
    }
    Ok(())
}

pub struct ModelRegistry {
    slots: DashMap<ModelKey, Slot>,
    ledger: Arc<QuotaLedger>,
    assets: Arc<AssetRegistry>,
    repository: Option<Arc<dyn StateRepository>>,
    persist_lock: Mutex<()>,
}

impl ModelRegistry {
    pub fn new(
        ledger: Arc<QuotaLedger>,
        assets: Arc<AssetRegistry>,
        repository: Option<Arc<dyn StateRepository>>,
    ) -> Self {
        Self { slots: DashMap::new(), ledger, assets, repository, persist_lock: Mutex::new(()) }
    }

    /// Replace in-memory state with previously persisted models.
    pub fn restore(&self, models: Vec<Model>) {
        self.slots.clear();
        for model in models {
            self.slots.insert(model.key(), Slot::Live(model));
        }
    }

    /// Create an idle model with no assets, charging one model unit.
    pub async fn create(
        &self,
        user_id: &UserId,
        name: &str,
        description: Option<String>,
    ) -> Result<Model, ModelError> {
        validate_model_name(name)?;
        let key = ModelKey::new(user_id.clone(), name);

        match self.slots.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(ModelError::Duplicate { name: name.to_string() });
            },
            Entry::Vacant(entry) => {
                entry.insert(Slot::Pending);
            },
        }

        if let Err(e) = self.ledger.reserve(user_id, Resource::Models, 1).await {
            self.slots.remove(&key);
            return Err(e.into());
        }

        let description = description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
        let model = Model::new(user_id.clone(), name, description);
        self.slots.insert(key.clone(), Slot::Live(model.clone()));
        self.persist(&key).await;

        info!("[ModelRegistry] Created model {}", key);
        Ok(model)
    }

    pub fn get(&self, key: &ModelKey) -> Option<Model> {
        match self.slots.get(key).as_deref() {
            Some(Slot::Live(model)) => Some(model.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, key: &ModelKey) -> bool {
        matches!(self.slots.get(key).as_deref(), Some(Slot::Live(_)))
    }

    /// The user's models, oldest first.
    pub fn list(&self, user_id: &UserId) -> Vec<Model> {
        let mut models: Vec<Model> = self
            .slots
            .iter()
            .filter(|entry| &entry.key().user_id == user_id)
            .filter_map(|entry| match entry.value() {
                Slot::Live(model) => Some(model.clone()),
                Slot::Pending | Slot::Retiring => None,
            })
            .collect();
        models.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        models
    }

    pub fn model_count(&self) -> usize {
        self.slots.iter().filter(|entry| matches!(entry.value(), Slot::Live(_))).count()
    }

    /// Apply `update` to a live model and write it through.
    async fn update_live<T>(
        &self,
        key: &ModelKey,
        update: impl FnOnce(&mut Model) -> T,
    ) -> Option<T> {
        let result = {
            let mut slot = self.slots.get_mut(key)?;
            match &mut *slot {
                Slot::Live(model) => {
                    let result = update(model);
                    model.updated_at = Utc::now();
                    result
                },
                Slot::Pending | Slot::Retiring => return None,
            }
        };
        self.persist(key).await;
        Some(result)
    }

    /// Record an uploaded asset on the model. Replaces an entry with the same file name.
    pub async fn attach_asset(&self, key: &ModelKey, asset: AssetRef) -> Result<(), ModelError> {
        self.update_live(key, |model| {
            match model.assets.iter_mut().find(|a| a.file_name == asset.file_name) {
                Some(existing) => *existing = asset,
                None => model.assets.push(asset),
            }
        })
        .await
        .ok_or_else(|| ModelError::NotFound { name: key.model_name.clone() })
    }

    pub async fn detach_asset(&self, key: &ModelKey, file_name: &str) -> Result<(), ModelError> {
        self.update_live(key, |model| model.assets.retain(|a| a.file_name != file_name))
            .await
            .ok_or_else(|| ModelError::NotFound { name: key.model_name.clone() })
    }

    /// Delete a model and all of its assets, returning its model unit.
    ///
    /// Refused while training is in flight. If an asset cannot be removed the
    /// model comes back with the assets that are still stored.
    pub async fn delete(&self, user_id: &UserId, name: &str) -> Result<(), ModelError> {
        let key = ModelKey::new(user_id.clone(), name);

        let model = {
            let mut slot = self
                .slots
                .get_mut(&key)
                .ok_or_else(|| ModelError::NotFound { name: name.to_string() })?;
            let model = match &*slot {
                Slot::Live(model) => model.clone(),
                Slot::Pending | Slot::Retiring => {
                    return Err(ModelError::NotFound { name: name.to_string() });
                },
            };
            if model.training_state.is_in_flight() {
                return Err(ModelError::TrainingInProgress { name: name.to_string() });
            }
            *slot = Slot::Retiring;
            model
        };

        if let Err(e) = self.assets.delete_all(&key).await {
            let remaining = self.assets.list(user_id, name);
            let mut restored = model;
            restored.assets.retain(|a| remaining.iter().any(|r| r.file_name == a.file_name));
            restored.updated_at = Utc::now();
            self.slots.insert(key.clone(), Slot::Live(restored));
            self.persist(&key).await;

            warn!("[ModelRegistry] Delete of {} aborted: {}", key, e);
            return Err(ModelError::StorageUnavailable {
                name: name.to_string(),
                message: e.to_string(),
            });
        }

        self.slots.remove(&key);
        self.ledger.release(user_id, Resource::Models, 1).await;
        self.persist(&key).await;

        info!("[ModelRegistry] Deleted model {}", key);
        Ok(())
    }

    /// Atomically move a live, idle model with `min..=max` assets to `Queued`.
    pub fn claim_for_training(
        &self,
        key: &ModelKey,
        min_images: usize,
        max_images: usize,
    ) -> Result<TrainingClaim, TrainingError> {
        let not_found = || TrainingError::ModelNotFound { model_name: key.model_name.clone() };
        let mut slot = self.slots.get_mut(key).ok_or_else(not_found)?;
        let Slot::Live(model) = &mut *slot else {
            return Err(not_found());
        };

        if model.training_state.is_in_flight() {
            return Err(TrainingError::InProgress { model_name: key.model_name.clone() });
        }
        let count = model.assets.len();
        if count < min_images || count > max_images {
            return Err(TrainingError::InsufficientAssets {
                count,
                min: min_images,
                max: max_images,
            });
        }

        let previous = model.training_state;
        model.training_state = TrainingState::Queued;
        model.updated_at = Utc::now();
        debug!("[ModelRegistry] {} claimed for training", key);
        Ok(TrainingClaim { previous, image_urls: model.asset_urls() })
    }

    /// Undo a claim whose submission did not go through.
    pub fn revert_claim(&self, key: &ModelKey, previous: TrainingState) {
        if let Some(mut slot) = self.slots.get_mut(key) {
            if let Slot::Live(model) = &mut *slot {
                if model.training_state == TrainingState::Queued {
                    model.training_state = previous;
                    model.updated_at = Utc::now();
                }
            }
        }
    }

    /// Attach the backend job to a claimed model.
    pub async fn bind_job(&self, key: &ModelKey, job_id: &str) {
        let bound = self
            .update_live(key, |model| {
                model.job_id = Some(job_id.to_string());
                model.training_state = TrainingState::Queued;
            })
            .await;
        if bound.is_none() {
            warn!("[ModelRegistry] Job {} submitted for vanished model {}", job_id, key);
        }
    }

    /// Mirror a non-terminal job state. Ignored unless `job_id` is the model's current job.
    pub async fn record_job_state(&self, key: &ModelKey, job_id: &str, state: TrainingState) {
        self.apply_job_update(key, job_id, state, None).await;
    }

    /// Mirror a terminal job state and store the trained weights locator.
    pub async fn finish_training(
        &self,
        key: &ModelKey,
        job_id: &str,
        state: TrainingState,
        artifact_url: Option<String>,
    ) {
        self.apply_job_update(key, job_id, state, artifact_url).await;
    }

    async fn apply_job_update(
        &self,
        key: &ModelKey,
        job_id: &str,
        state: TrainingState,
        artifact_url: Option<String>,
    ) {
        let applied = self
            .update_live(key, |model| {
                if model.job_id.as_deref() != Some(job_id) || !model.training_state.accepts(state) {
                    return false;
                }
                model.training_state = state;
                if artifact_url.is_some() {
                    model.artifact_url = artifact_url;
                }
                true
            })
            .await;
        match applied {
            Some(true) => debug!("[ModelRegistry] {} is now {}", key, state),
            Some(false) => {
                debug!("[ModelRegistry] Ignoring stale {} from job {} for {}", state, job_id, key)
            },
            None => warn!("[ModelRegistry] Job {} finished for missing model {}", job_id, key),
        }
    }

    /// Write the model's current record through to the repository.
    async fn persist(&self, key: &ModelKey) {
        let Some(repository) = &self.repository else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        let current = self.slots.get(key).map(|slot| slot.clone());
        let result = match current {
            Some(Slot::Live(model)) => repository.save_model(&model).await,
            Some(Slot::Pending | Slot::Retiring) => return,
            None => repository.delete_model(key).await,
        };
        if let Err(e) = result {
            error!("[ModelRegistry] Failed to persist model {}: {}", key, e);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collaborators::MemoryStorage;
    use crate::modules::retry::RetryPolicy;
    use bytes::Bytes;
    use morphika_types::models::PlanTier;

    struct Fixture {
        registry: Arc<ModelRegistry>,
        assets: Arc<AssetRegistry>,
        storage: Arc<MemoryStorage>,
        ledger: Arc<QuotaLedger>,
        user: UserId,
    }

    async fn fixture() -> Fixture {
        let storage = Arc::new(MemoryStorage::new("memory://bucket"));
        let ledger = Arc::new(QuotaLedger::new(None));
        let user = UserId::new("u1");
        ledger.open_account(&user, PlanTier::Starter).await;
        let assets =
            Arc::new(AssetRegistry::new(storage.clone(), ledger.clone(), RetryPolicy::none(), None));
        let registry = Arc::new(ModelRegistry::new(ledger.clone(), assets.clone(), None));
        Fixture { registry, assets, storage, ledger, user }
    }

    async fn add_images(f: &Fixture, model: &str, count: usize) {
        let key = ModelKey::new(f.user.clone(), model);
        for i in 0..count {
            let asset = f
                .assets
                .upload(&f.user, model, &format!("{i}.png"), Bytes::from(vec![i as u8]), false)
                .await
                .unwrap();
            f.registry.attach_asset(&key, asset.to_ref()).await.unwrap();
        }
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_model_name("My cat_2-final").is_ok());
        assert!(validate_model_name("").is_err());
        assert!(validate_model_name("   ").is_err());
        assert!(validate_model_name("a/b").is_err());
        assert!(validate_model_name(&"x".repeat(65)).is_err());
        assert!(validate_model_name(&"x".repeat(64)).is_ok());
    }

    #[tokio::test]
    async fn test_create_and_duplicate() {
        let f = fixture().await;
        let model = f.registry.create(&f.user, "cats", Some("  ".to_string())).await.unwrap();
        assert_eq!(model.training_state, TrainingState::Idle);
        assert!(model.description.is_none());

        let err = f.registry.create(&f.user, "cats", None).await.unwrap_err();
        assert!(matches!(err, ModelError::Duplicate { .. }));
        assert_eq!(f.ledger.usage(&f.user).await.unwrap().consumed.models, 1);
    }

    #[tokio::test]
    async fn test_quota_failure_frees_the_name() {
        let f = fixture().await;
        for i in 0..5 {
            f.registry.create(&f.user, &format!("m{i}"), None).await.unwrap();
        }
        let err = f.registry.create(&f.user, "extra", None).await.unwrap_err();
        assert!(matches!(err, ModelError::Quota(_)));
        assert!(f.registry.get(&ModelKey::new(f.user.clone(), "extra")).is_none());

        f.registry.delete(&f.user, "m0").await.unwrap();
        f.registry.create(&f.user, "extra", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_cascades_assets() {
        let f = fixture().await;
        f.registry.create(&f.user, "cats", None).await.unwrap();
        add_images(&f, "cats", 3).await;

        f.registry.delete(&f.user, "cats").await.unwrap();
        let usage = f.ledger.usage(&f.user).await.unwrap();
        assert_eq!(usage.consumed.models, 0);
        assert_eq!(usage.consumed.photos, 0);
        assert_eq!(f.storage.object_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_cascade_keeps_model() {
        let f = fixture().await;
        f.registry.create(&f.user, "cats", None).await.unwrap();
        add_images(&f, "cats", 2).await;
        f.storage.fail_next(1);

        let err = f.registry.delete(&f.user, "cats").await.unwrap_err();
        assert!(matches!(err, ModelError::StorageUnavailable { .. }));
        let model = f.registry.get(&ModelKey::new(f.user.clone(), "cats")).unwrap();
        assert_eq!(model.assets.len(), 2);
        assert_eq!(f.ledger.usage(&f.user).await.unwrap().consumed.models, 1);
    }

    #[tokio::test]
    async fn test_claim_checks_asset_range_and_flight() {
        let f = fixture().await;
        let key = ModelKey::new(f.user.clone(), "cats");
        f.registry.create(&f.user, "cats", None).await.unwrap();
        add_images(&f, "cats", 7).await;

        let err = f.registry.claim_for_training(&key, 8, 15).unwrap_err();
        assert!(matches!(err, TrainingError::InsufficientAssets { count: 7, .. }));

        add_images(&f, "cats", 1).await;
        let claim = f.registry.claim_for_training(&key, 8, 15).unwrap();
        assert_eq!(claim.previous, TrainingState::Idle);
        assert_eq!(claim.image_urls.len(), 8);

        let err = f.registry.claim_for_training(&key, 8, 15).unwrap_err();
        assert!(matches!(err, TrainingError::InProgress { .. }));
        assert!(matches!(
            f.registry.delete(&f.user, "cats").await,
            Err(ModelError::TrainingInProgress { .. })
        ));

        f.registry.revert_claim(&key, claim.previous);
        assert_eq!(f.registry.get(&key).unwrap().training_state, TrainingState::Idle);
    }

    #[tokio::test]
    async fn test_stale_job_updates_are_ignored() {
        let f = fixture().await;
        let key = ModelKey::new(f.user.clone(), "cats");
        f.registry.create(&f.user, "cats", None).await.unwrap();
        f.registry.bind_job(&key, "job-2").await;

        f.registry.finish_training(&key, "job-1", TrainingState::Failed, None).await;
        assert_eq!(f.registry.get(&key).unwrap().training_state, TrainingState::Queued);

        f.registry
            .finish_training(&key, "job-2", TrainingState::Succeeded, Some("w://1".to_string()))
            .await;
        let model = f.registry.get(&key).unwrap();
        assert_eq!(model.training_state, TrainingState::Succeeded);
        assert_eq!(model.artifact_url.as_deref(), Some("w://1"));
    }

    #[tokio::test]
    async fn test_late_job_state_does_not_reopen_finished_model() {
        let f = fixture().await;
        let key = ModelKey::new(f.user.clone(), "cats");
        f.registry.create(&f.user, "cats", None).await.unwrap();
        f.registry.bind_job(&key, "job-1").await;

        f.registry.record_job_state(&key, "job-1", TrainingState::Running).await;
        f.registry
            .finish_training(&key, "job-1", TrainingState::Succeeded, Some("w://1".to_string()))
            .await;
        f.registry.record_job_state(&key, "job-1", TrainingState::Running).await;
        f.registry.record_job_state(&key, "job-1", TrainingState::Queued).await;
        f.registry.finish_training(&key, "job-1", TrainingState::Failed, None).await;

        let model = f.registry.get(&key).unwrap();
        assert_eq!(model.training_state, TrainingState::Succeeded);
        assert_eq!(model.artifact_url.as_deref(), Some("w://1"));
        f.registry.delete(&f.user, "cats").await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_one_model() {
        let f = fixture().await;
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = f.registry.clone();
            let user = f.user.clone();
            handles.push(tokio::spawn(async move { registry.create(&user, "same", None).await }));
        }

        let mut created = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => created += 1,
                Err(e) => assert!(matches!(e, ModelError::Duplicate { .. })),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(f.ledger.usage(&f.user).await.unwrap().consumed.models, 1);
    }
}
