//! In-process collaborators.
//!
//! Used for local runs without external accounts and throughout the tests.
//! Storage, training, generation and billing can be told to fail their next N
//! calls with a transient error.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use morphika_types::error::{AuthError, CollaboratorError};
use morphika_types::models::{
    BackendStatus, GenerationRequest, PlanTier, PredictionStatus, TrainingPhase, TrainingRequest,
    UserId,
};
use parking_lot::{Mutex, RwLock};

use super::{
    BillingProvider, IdentityProvider, ImageGenerator, ObjectStorage, StoredObject, TrainingBackend,
};

/// Consumes one pending injected failure, if any.
#[derive(Debug, Default)]
struct FailureBudget(AtomicU32);

impl FailureBudget {
    fn set(&self, count: u32) {
        self.0.store(count, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok()
    }
}

/// Token table identity provider.
pub struct StaticIdentity {
    tokens: RwLock<HashMap<String, UserId>>,
    permissive: bool,
}

impl StaticIdentity {
    /// Only tokens registered with [`Self::with_user`] are accepted.
    pub fn new() -> Self {
        Self { tokens: RwLock::new(HashMap::new()), permissive: false }
    }

    /// Unknown tokens are accepted and used verbatim as the user id.
    pub fn permissive() -> Self {
        Self { tokens: RwLock::new(HashMap::new()), permissive: true }
    }

    pub fn with_user(self, token: &str, user_id: impl Into<UserId>) -> Self {
        self.tokens.write().insert(token.to_string(), user_id.into());
        self
    }
}

impl Default for StaticIdentity {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_user(&self, access_token: &str) -> Result<UserId, AuthError> {
        let token = access_token.trim();
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        if let Some(user_id) = self.tokens.read().get(token) {
            return Ok(user_id.clone());
        }
        if self.permissive {
            return Ok(UserId::new(token));
        }
        Err(AuthError::Unauthenticated)
    }
}

#[derive(Debug, Clone)]
struct StoredBlob {
    bytes: Bytes,
    updated_at: DateTime<Utc>,
}

/// Object storage backed by a sorted map.
pub struct MemoryStorage {
    base_url: String,
    objects: RwLock<BTreeMap<String, StoredBlob>>,
    failures: FailureBudget,
    puts: AtomicU32,
}

impl MemoryStorage {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            objects: RwLock::new(BTreeMap::new()),
            failures: FailureBudget::default(),
            puts: AtomicU32::new(0),
        }
    }

    /// Fail the next `count` calls with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.failures.set(count);
    }

    /// Number of successful `put` calls so far.
    pub fn put_count(&self) -> u32 {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects.read().contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.objects.read().get(path).map(|blob| blob.bytes.clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len()
    }

    /// Place an object directly, bypassing `put` accounting.
    pub fn insert_raw(&self, path: &str, bytes: impl Into<Bytes>) {
        let blob = StoredBlob { bytes: bytes.into(), updated_at: Utc::now() };
        self.objects.write().insert(path.to_string(), blob);
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        _content_type: &str,
        upsert: bool,
    ) -> Result<String, CollaboratorError> {
        if self.failures.take() {
            return Err(CollaboratorError::unavailable("storage", "injected failure"));
        }
        {
            let mut objects = self.objects.write();
            if !upsert && objects.contains_key(path) {
                return Err(CollaboratorError::rejected("storage", 409, "The resource already exists"));
            }
            objects.insert(path.to_string(), StoredBlob { bytes, updated_at: Utc::now() });
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(self.public_url(path))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, CollaboratorError> {
        if self.failures.take() {
            return Err(CollaboratorError::unavailable("storage", "injected failure"));
        }
        let dir = format!("{}/", prefix.trim_end_matches('/'));
        let objects = self.objects.read();
        Ok(objects
            .range(dir.clone()..)
            .take_while(|(path, _)| path.starts_with(&dir))
            .filter_map(|(path, blob)| {
                let name = &path[dir.len()..];
                (!name.contains('/')).then(|| StoredObject {
                    name: name.to_string(),
                    size_bytes: Some(blob.bytes.len() as u64),
                    updated_at: Some(blob.updated_at),
                })
            })
            .collect())
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn remove(&self, path: &str) -> Result<(), CollaboratorError> {
        if self.failures.take() {
            return Err(CollaboratorError::unavailable("storage", "injected failure"));
        }
        self.objects.write().remove(path);
        Ok(())
    }
}

/// Training backend whose jobs only move when told to.
///
/// With [`Self::auto_advancing`] every status query moves a job one phase
/// forward: starting, processing, succeeded.
pub struct MemoryTrainingBackend {
    jobs: DashMap<String, BackendStatus>,
    submissions: Mutex<Vec<TrainingRequest>>,
    failures: FailureBudget,
    auto_advance: bool,
}

impl MemoryTrainingBackend {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
            submissions: Mutex::new(Vec::new()),
            failures: FailureBudget::default(),
            auto_advance: false,
        }
    }

    pub fn auto_advancing() -> Self {
        Self { auto_advance: true, ..Self::new() }
    }

    /// Fail the next `count` calls with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.failures.set(count);
    }

    /// Script the status the next queries for `job_id` return.
    pub fn set_status(&self, job_id: &str, status: BackendStatus) {
        self.jobs.insert(job_id.to_string(), status);
    }

    pub fn submissions(&self) -> Vec<TrainingRequest> {
        self.submissions.lock().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    fn advance(job_id: &str, status: &mut BackendStatus) {
        match status.phase {
            TrainingPhase::Starting => status.phase = TrainingPhase::Processing,
            TrainingPhase::Processing => {
                status.phase = TrainingPhase::Succeeded;
                status.artifact_url = Some(format!("memory://weights/{}.safetensors", job_id));
            },
            TrainingPhase::Succeeded | TrainingPhase::Failed | TrainingPhase::Canceled => {},
        }
    }
}

impl Default for MemoryTrainingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrainingBackend for MemoryTrainingBackend {
    async fn submit_training(&self, request: &TrainingRequest) -> Result<String, CollaboratorError> {
        if self.failures.take() {
            return Err(CollaboratorError::unavailable("training", "injected failure"));
        }
        let job_id = format!("mem-{}", uuid::Uuid::new_v4().simple());
        self.jobs.insert(job_id.clone(), BackendStatus::new(TrainingPhase::Starting));
        self.submissions.lock().push(request.clone());
        Ok(job_id)
    }

    async fn get_status(&self, job_id: &str) -> Result<BackendStatus, CollaboratorError> {
        if self.failures.take() {
            return Err(CollaboratorError::unavailable("training", "injected failure"));
        }
        let mut status = self.jobs.get_mut(job_id).ok_or_else(|| CollaboratorError::NotFound {
            service: "training".to_string(),
            what: format!("job {}", job_id),
        })?;
        if self.auto_advance {
            Self::advance(job_id, &mut status);
        }
        Ok(status.clone())
    }
}

struct Prediction {
    pending_polls: u32,
    outcome: PredictionStatus,
}

/// Image generator that answers with placeholder URLs.
///
/// A prediction reports `processing` for the configured number of status
/// queries and then its outcome.
pub struct MemoryImageGenerator {
    predictions: DashMap<String, Prediction>,
    requests: Mutex<Vec<GenerationRequest>>,
    failures: FailureBudget,
    pending_polls: AtomicU32,
    failure_message: RwLock<Option<String>>,
}

impl MemoryImageGenerator {
    pub fn new() -> Self {
        Self {
            predictions: DashMap::new(),
            requests: Mutex::new(Vec::new()),
            failures: FailureBudget::default(),
            pending_polls: AtomicU32::new(0),
            failure_message: RwLock::new(None),
        }
    }

    /// Fail the next `count` calls with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.failures.set(count);
    }

    /// New predictions stay `processing` for `polls` status queries.
    pub fn set_pending_polls(&self, polls: u32) {
        self.pending_polls.store(polls, Ordering::SeqCst);
    }

    /// New predictions end `failed` with `message`; `None` restores success.
    pub fn fail_predictions(&self, message: Option<&str>) {
        *self.failure_message.write() = message.map(str::to_string);
    }

    /// Script the status the next queries for `prediction_id` return.
    pub fn set_status(&self, prediction_id: &str, status: PredictionStatus) {
        self.predictions
            .insert(prediction_id.to_string(), Prediction { pending_polls: 0, outcome: status });
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

impl Default for MemoryImageGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageGenerator for MemoryImageGenerator {
    async fn create_prediction(&self, request: &GenerationRequest) -> Result<String, CollaboratorError> {
        if self.failures.take() {
            return Err(CollaboratorError::unavailable("generation", "injected failure"));
        }
        let prediction_id = format!("pred-{}", uuid::Uuid::new_v4().simple());
        let outcome = match self.failure_message.read().clone() {
            Some(message) => PredictionStatus {
                phase: TrainingPhase::Failed,
                images: Vec::new(),
                error: Some(message),
            },
            None => PredictionStatus::succeeded(
                (0..request.num_outputs)
                    .map(|n| format!("memory://generated/{}-{}.png", prediction_id, n))
                    .collect(),
            ),
        };
        let pending_polls = self.pending_polls.load(Ordering::SeqCst);
        self.predictions.insert(prediction_id.clone(), Prediction { pending_polls, outcome });
        self.requests.lock().push(request.clone());
        Ok(prediction_id)
    }

    async fn get_prediction(&self, prediction_id: &str) -> Result<PredictionStatus, CollaboratorError> {
        if self.failures.take() {
            return Err(CollaboratorError::unavailable("generation", "injected failure"));
        }
        let mut prediction =
            self.predictions.get_mut(prediction_id).ok_or_else(|| CollaboratorError::NotFound {
                service: "generation".to_string(),
                what: format!("prediction {}", prediction_id),
            })?;
        if prediction.pending_polls > 0 {
            prediction.pending_polls -= 1;
            return Ok(PredictionStatus::new(TrainingPhase::Processing));
        }
        Ok(prediction.outcome.clone())
    }
}

/// Billing provider with a fixed plan table.
pub struct StaticBilling {
    plans: RwLock<HashMap<UserId, PlanTier>>,
    failures: FailureBudget,
}

impl StaticBilling {
    pub fn new() -> Self {
        Self { plans: RwLock::new(HashMap::new()), failures: FailureBudget::default() }
    }

    pub fn set_plan(&self, user_id: &UserId, tier: PlanTier) {
        self.plans.write().insert(user_id.clone(), tier);
    }

    /// Fail the next `count` calls with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.failures.set(count);
    }
}

impl Default for StaticBilling {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BillingProvider for StaticBilling {
    async fn plan_for(&self, user_id: &UserId) -> Result<Option<PlanTier>, CollaboratorError> {
        if self.failures.take() {
            return Err(CollaboratorError::unavailable("billing", "injected failure"));
        }
        Ok(self.plans.read().get(user_id).copied())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_storage_list_is_one_level() {
        let storage = MemoryStorage::new("memory://bucket/");
        storage.insert_raw("models/u1/cats/a.png", vec![1, 2, 3]);
        storage.insert_raw("models/u1/cats/nested/b.png", vec![1]);
        storage.insert_raw("models/u1/cats2/c.png", vec![1]);

        let listed = storage.list("models/u1/cats").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "a.png");
        assert_eq!(listed[0].size_bytes, Some(3));
        assert_eq!(storage.public_url("x/y.png"), "memory://bucket/x/y.png");
    }

    #[tokio::test]
    async fn test_storage_respects_upsert_flag() {
        let storage = MemoryStorage::new("memory://bucket");
        storage.put("p.png", Bytes::from_static(b"1"), "image/png", false).await.unwrap();
        let err = storage.put("p.png", Bytes::from_static(b"2"), "image/png", false).await;
        assert!(matches!(err, Err(CollaboratorError::Rejected { status: 409, .. })));

        storage.put("p.png", Bytes::from_static(b"2"), "image/png", true).await.unwrap();
        assert_eq!(storage.get("p.png").unwrap(), Bytes::from_static(b"2"));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let storage = MemoryStorage::new("memory://bucket");
        storage.fail_next(2);
        assert!(storage.remove("x").await.is_err());
        assert!(storage.remove("x").await.is_err());
        assert!(storage.remove("x").await.is_ok());
    }

    #[tokio::test]
    async fn test_auto_advancing_backend() {
        let backend = MemoryTrainingBackend::auto_advancing();
        let request = TrainingRequest {
            images: vec!["memory://a.png".to_string()],
            destination: "u1/cats".to_string(),
            params: Default::default(),
            webhook: None,
        };
        let job_id = backend.submit_training(&request).await.unwrap();

        assert_eq!(backend.get_status(&job_id).await.unwrap().phase, TrainingPhase::Processing);
        let done = backend.get_status(&job_id).await.unwrap();
        assert_eq!(done.phase, TrainingPhase::Succeeded);
        assert!(done.artifact_url.unwrap().contains(&job_id));
        assert_eq!(backend.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_generator_reports_outputs_after_pending_polls() {
        let generator = MemoryImageGenerator::new();
        generator.set_pending_polls(1);
        let request = GenerationRequest {
            weights: "memory://weights/job.safetensors".to_string(),
            prompt: "a cat".to_string(),
            num_outputs: 2,
        };
        let id = generator.create_prediction(&request).await.unwrap();

        assert_eq!(generator.get_prediction(&id).await.unwrap().phase, TrainingPhase::Processing);
        let done = generator.get_prediction(&id).await.unwrap();
        assert_eq!(done.phase, TrainingPhase::Succeeded);
        assert_eq!(done.images.len(), 2);
        assert!(done.images[0].contains(&id));
        assert_eq!(generator.requests(), vec![request]);

        let missing = generator.get_prediction("pred-unknown").await;
        assert!(matches!(missing, Err(CollaboratorError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_generator_scripted_failure() {
        let generator = MemoryImageGenerator::new();
        generator.fail_predictions(Some("nsfw content detected"));
        let request = GenerationRequest {
            weights: "w".to_string(),
            prompt: "p".to_string(),
            num_outputs: 1,
        };
        let id = generator.create_prediction(&request).await.unwrap();
        let status = generator.get_prediction(&id).await.unwrap();
        assert_eq!(status.phase, TrainingPhase::Failed);
        assert_eq!(status.error.as_deref(), Some("nsfw content detected"));
        assert!(status.images.is_empty());
    }

    #[tokio::test]
    async fn test_identity_modes() {
        let strict = StaticIdentity::new().with_user("tok-1", "user-1");
        assert_eq!(strict.current_user("tok-1").await.unwrap().as_str(), "user-1");
        assert!(strict.current_user("other").await.is_err());
        assert!(strict.current_user("  ").await.is_err());

        let open = StaticIdentity::permissive();
        assert_eq!(open.current_user("alice").await.unwrap().as_str(), "alice");
    }
}
