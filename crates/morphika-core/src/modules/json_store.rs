//! File-backed [`StateRepository`].
//!
//! Layout under the root directory:
//!
//! ```text
//! accounts/<user>.json
//! models/<user>/<model>.json
//! assets/<user>/<model>.json
//! jobs/<job_id>.json
//! ```
//!
//! Every write goes to a `.tmp` sibling first and is renamed into place.
//! Path components are percent-encoded so that distinct names never share a file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use morphika_types::models::{ImageAsset, Model, ModelKey, TrainingJob, UserAccount, UserId};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tracing::{debug, warn};

use super::repository::{RepoResult, StateRepository};

const ACCOUNTS_DIR: &str = "accounts";
const MODELS_DIR: &str = "models";
const ASSETS_DIR: &str = "assets";
const JOBS_DIR: &str = "jobs";

pub struct JsonRepository {
    root: PathBuf,
}

impl JsonRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn account_path(&self, user_id: &UserId) -> PathBuf {
        self.root.join(ACCOUNTS_DIR).join(json_file(user_id.as_str()))
    }

    fn keyed_path(&self, dir: &str, key: &ModelKey) -> PathBuf {
        self.root
            .join(dir)
            .join(encode_component(key.user_id.as_str()))
            .join(json_file(&key.model_name))
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.root.join(JOBS_DIR).join(json_file(job_id))
    }
}

/// Everything outside `[A-Za-z0-9_-]` is percent-encoded.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, COMPONENT).to_string()
}

fn json_file(raw: &str) -> String {
    format!("{}.json", encode_component(raw))
}

async fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> RepoResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let temp_path = path.with_extension("json.tmp");
    let content = serde_json::to_vec_pretty(value)?;

    if let Err(e) = fs::write(&temp_path, content).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }
    Ok(())
}

async fn remove_if_exists(path: &Path) -> RepoResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Collect `*.json` files in `dir` and, when `nested`, one level of subdirectories.
async fn json_files(dir: &Path, nested: bool) -> RepoResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![(dir.to_path_buf(), nested)];

    while let Some((current, descend)) = pending.pop() {
        let mut entries = match fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                if descend {
                    pending.push((path, false));
                }
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Parse every file, skipping the ones that fail to read or decode.
async fn load_all<T: DeserializeOwned>(dir: &Path, nested: bool) -> RepoResult<Vec<T>> {
    let mut records = Vec::new();
    for path in json_files(dir, nested).await? {
        let content = match fs::read(&path).await {
            Ok(content) => content,
            Err(e) => {
                warn!("[JsonRepository] Skipping unreadable {}: {}", path.display(), e);
                continue;
            },
        };
        match serde_json::from_slice(&content) {
            Ok(record) => records.push(record),
            Err(e) => warn!("[JsonRepository] Skipping corrupted {}: {}", path.display(), e),
        }
    }
    debug!("[JsonRepository] Loaded {} records from {}", records.len(), dir.display());
    Ok(records)
}

#[async_trait]
impl StateRepository for JsonRepository {
    async fn load_accounts(&self) -> RepoResult<Vec<UserAccount>> {
        load_all(&self.root.join(ACCOUNTS_DIR), false).await
    }

    async fn save_account(&self, account: &UserAccount) -> RepoResult<()> {
        write_atomic(&self.account_path(&account.user_id), account).await
    }

    async fn load_models(&self) -> RepoResult<Vec<Model>> {
        load_all(&self.root.join(MODELS_DIR), true).await
    }

    async fn save_model(&self, model: &Model) -> RepoResult<()> {
        write_atomic(&self.keyed_path(MODELS_DIR, &model.key()), model).await
    }

    async fn delete_model(&self, key: &ModelKey) -> RepoResult<()> {
        remove_if_exists(&self.keyed_path(MODELS_DIR, key)).await?;
        remove_if_exists(&self.keyed_path(ASSETS_DIR, key)).await
    }

    async fn load_assets(&self) -> RepoResult<Vec<ImageAsset>> {
        let lists: Vec<Vec<ImageAsset>> = load_all(&self.root.join(ASSETS_DIR), true).await?;
        Ok(lists.into_iter().flatten().collect())
    }

    async fn save_assets(&self, key: &ModelKey, assets: &[ImageAsset]) -> RepoResult<()> {
        let path = self.keyed_path(ASSETS_DIR, key);
        if assets.is_empty() {
            return remove_if_exists(&path).await;
        }
        write_atomic(&path, assets).await
    }

    async fn load_jobs(&self) -> RepoResult<Vec<TrainingJob>> {
        load_all(&self.root.join(JOBS_DIR), false).await
    }

    async fn save_job(&self, job: &TrainingJob) -> RepoResult<()> {
        write_atomic(&self.job_path(&job.job_id), job).await
    }
}
