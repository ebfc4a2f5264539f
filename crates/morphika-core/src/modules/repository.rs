//! State repository trait for persistence abstraction.
//!
//! The ledger and registries keep their working state in memory and write
//! through to a repository after every mutation. On startup the studio
//! restores from the same repository.

use async_trait::async_trait;
use morphika_types::models::{ImageAsset, Model, ModelKey, TrainingJob, UserAccount};

pub type RepoResult<T> = Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(e: std::io::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn load_accounts(&self) -> RepoResult<Vec<UserAccount>>;
    async fn save_account(&self, account: &UserAccount) -> RepoResult<()>;

    async fn load_models(&self) -> RepoResult<Vec<Model>>;
    async fn save_model(&self, model: &Model) -> RepoResult<()>;
    /// Removes the model record and its asset list.
    async fn delete_model(&self, key: &ModelKey) -> RepoResult<()>;

    async fn load_assets(&self) -> RepoResult<Vec<ImageAsset>>;
    /// Replaces the asset list of one model. An empty list removes the record.
    async fn save_assets(&self, key: &ModelKey, assets: &[ImageAsset]) -> RepoResult<()>;

    async fn load_jobs(&self) -> RepoResult<Vec<TrainingJob>>;
    async fn save_job(&self, job: &TrainingJob) -> RepoResult<()>;
}
