//! External services the studio depends on.
//!
//! Each service is a trait so that the HTTP-backed implementations
//! ([`supabase`], [`replicate`]) and the in-process ones ([`memory`]) are
//! interchangeable. All calls are async and may fail; transient failures are
//! retried by the callers through [`crate::modules::retry`].

pub mod http;
pub mod memory;
pub mod replicate;
pub mod supabase;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use morphika_types::error::{AuthError, CollaboratorError};
use morphika_types::models::{
    AppConfig, BackendStatus, GenerationRequest, PlanTier, PredictionStatus, TrainingRequest, UserId,
};
use tracing::info;

use crate::error::AppResult;

pub use memory::{
    MemoryImageGenerator, MemoryStorage, MemoryTrainingBackend, StaticBilling, StaticIdentity,
};
pub use replicate::ReplicateBackend;
pub use supabase::SupabaseClient;

/// Resolves an access token to the signed-in user.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_user(&self, access_token: &str) -> Result<UserId, AuthError>;
}

/// Object metadata returned by [`ObjectStorage::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object name relative to the listed prefix
    pub name: String,
    pub size_bytes: Option<u64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Blob store for training images.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `path` and return its public URL.
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
        upsert: bool,
    ) -> Result<String, CollaboratorError>;

    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, CollaboratorError>;

    fn public_url(&self, path: &str) -> String;

    /// Remove the object at `path`. Removing a missing object is not an error.
    async fn remove(&self, path: &str) -> Result<(), CollaboratorError>;
}

/// Remote service that fine-tunes a model from a set of images.
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    /// Start a training run and return its job id.
    async fn submit_training(&self, request: &TrainingRequest) -> Result<String, CollaboratorError>;

    async fn get_status(&self, job_id: &str) -> Result<BackendStatus, CollaboratorError>;
}

/// Runs predictions against trained weights.
///
/// Creation and polling are separate calls so a slow prediction is waited on
/// rather than started again.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Start a prediction and return its id.
    async fn create_prediction(&self, request: &GenerationRequest) -> Result<String, CollaboratorError>;

    async fn get_prediction(&self, prediction_id: &str) -> Result<PredictionStatus, CollaboratorError>;
}

/// Source of truth for the user's subscription.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// `Ok(None)` when the user has no subscription on record.
    async fn plan_for(&self, user_id: &UserId) -> Result<Option<PlanTier>, CollaboratorError>;
}

/// The full set of collaborators a studio runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub storage: Arc<dyn ObjectStorage>,
    pub training: Arc<dyn TrainingBackend>,
    pub generator: Arc<dyn ImageGenerator>,
    pub billing: Arc<dyn BillingProvider>,
}

impl Collaborators {
    /// In-process collaborators with no external dependencies.
    ///
    /// Any bearer token is accepted and used as the user id, training jobs
    /// advance one phase per status query and predictions finish at once.
    pub fn local() -> Self {
        Self {
            identity: Arc::new(StaticIdentity::permissive()),
            storage: Arc::new(MemoryStorage::new("memory://morphika")),
            training: Arc::new(MemoryTrainingBackend::auto_advancing()),
            generator: Arc::new(MemoryImageGenerator::new()),
            billing: Arc::new(StaticBilling::new()),
        }
    }

    /// Pick implementations according to `config`.
    ///
    /// Supabase backs identity, storage and billing when `supabase.url` is set;
    /// Replicate backs training and generation when `replicate.enabled`.
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        let mut collaborators = Self::local();

        if config.supabase.is_enabled() {
            let supabase = Arc::new(SupabaseClient::from_config(&config.supabase)?);
            info!("[Collaborators] Using Supabase at {}", config.supabase.url);
            collaborators.identity = supabase.clone();
            collaborators.storage = supabase.clone();
            collaborators.billing = supabase;
        } else {
            info!("[Collaborators] Supabase disabled, using in-memory identity and storage");
        }

        if config.replicate.enabled {
            info!("[Collaborators] Using Replicate at {}", config.replicate.base_url);
            let replicate = Arc::new(ReplicateBackend::from_config(&config.replicate)?);
            collaborators.training = replicate.clone();
            collaborators.generator = replicate;
        } else {
            info!("[Collaborators] Replicate disabled, using in-memory training and generation");
        }

        Ok(collaborators)
    }
}

/// MIME type for an allowed image file name.
pub fn content_type_for(file_name: &str) -> &'static str {
    let ext = file_name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
