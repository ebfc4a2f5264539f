//! Asset registry: training images per model, backed by object storage.
//!
//! Each `(model, file name)` key has its own async lock, held for the whole
//! upload or delete including the storage call. Two uploads of the same new
//! key therefore resolve to one success and one `Duplicate`, and a delete never
//! interleaves with an overwrite of the same file.
//!
//! Photo units are reserved before the storage write and released again when
//! the write fails, so usage always matches the assets on record.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use morphika_types::error::{AssetError, CollaboratorError, QuotaError};
use morphika_types::models::{
    is_image_file, model_prefix, storage_path, ImageAsset, ModelKey, Resource, UserId,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::quota::QuotaLedger;
use super::repository::StateRepository;
use super::retry::{retry_transient, RetryPolicy};
use crate::collaborators::{content_type_for, ObjectStorage};

type AssetKey = (ModelKey, String);
type LockMap = DashMap<AssetKey, Arc<Mutex<()>>>;

/// Held per-file lock. Dropping it removes the map entry unless another
/// caller is holding or waiting on the same lock.
struct FileLock<'a> {
    locks: &'a LockMap,
    key: AssetKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Outcome of [`AssetRegistry::reconcile`].
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Assets adopted from storage
    pub imported: Vec<ImageAsset>,
    /// Objects skipped because they are not images
    pub skipped_non_images: usize,
    /// Import stopped early because the photo limit was reached
    pub quota_limited: bool,
}

pub struct AssetRegistry {
    assets: DashMap<ModelKey, Vec<ImageAsset>>,
    locks: LockMap,
    storage: Arc<dyn ObjectStorage>,
    ledger: Arc<QuotaLedger>,
    retry: RetryPolicy,
    repository: Option<Arc<dyn StateRepository>>,
    persist_lock: Mutex<()>,
}

/// Lowercase hex SHA-256.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn validate_file_name(file_name: &str) -> Result<(), AssetError> {
    let invalid = file_name.trim().is_empty()
        || file_name.len() > 255
        || file_name == "."
        || file_name == ".."
        || file_name.contains(['/', '\\'])
        || file_name.chars().any(char::is_control);
    if invalid {
        return Err(AssetError::InvalidFileName { file_name: file_name.to_string() });
    }
    Ok(())
}

impl AssetRegistry {
    pub fn new(
        storage: Arc<dyn ObjectStorage>,
        ledger: Arc<QuotaLedger>,
        retry: RetryPolicy,
        repository: Option<Arc<dyn StateRepository>>,
    ) -> Self {
        Self {
            assets: DashMap::new(),
            locks: DashMap::new(),
            storage,
            ledger,
            retry,
            repository,
            persist_lock: Mutex::new(()),
        }
    }

    /// Replace in-memory state with previously persisted assets.
    pub fn restore(&self, assets: Vec<ImageAsset>) {
        let mut grouped: HashMap<ModelKey, Vec<ImageAsset>> = HashMap::new();
        for asset in assets {
            grouped.entry(asset.key()).or_default().push(asset);
        }
        self.assets.clear();
        for (key, mut list) in grouped {
            list.sort_by_key(|asset| asset.uploaded_at);
            self.assets.insert(key, list);
        }
    }

    async fn lock_file(&self, key: &ModelKey, file_name: &str) -> FileLock<'_> {
        let asset_key = (key.clone(), file_name.to_string());
        let lock = self.locks.entry(asset_key.clone()).or_default().value().clone();
        let guard = lock.lock_owned().await;
        FileLock { locks: &self.locks, key: asset_key, guard: Some(guard) }
    }

    /// Per-file locks currently allocated.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    pub fn find(&self, key: &ModelKey, file_name: &str) -> Option<ImageAsset> {
        self.assets
            .get(key)
            .and_then(|list| list.iter().find(|asset| asset.file_name == file_name).cloned())
    }

    pub fn count(&self, key: &ModelKey) -> usize {
        self.assets.get(key).map_or(0, |list| list.len())
    }

    pub fn total_count(&self) -> usize {
        self.assets.iter().map(|entry| entry.value().len()).sum()
    }

    /// Image assets of a model in upload order.
    pub fn list(&self, user_id: &UserId, model_name: &str) -> Vec<ImageAsset> {
        let key = ModelKey::new(user_id.clone(), model_name);
        let mut assets: Vec<ImageAsset> = self
            .assets
            .get(&key)
            .map(|list| list.iter().filter(|a| is_image_file(&a.file_name)).cloned().collect())
            .unwrap_or_default();
        assets.sort_by_key(|asset| asset.uploaded_at);
        assets
    }

    /// Store an image under `(model, file_name)`.
    ///
    /// A new key consumes one photo unit. With `overwrite` an existing key is
    /// replaced in place without consuming another unit; identical content
    /// short-circuits without touching storage.
    pub async fn upload(
        &self,
        user_id: &UserId,
        model_name: &str,
        file_name: &str,
        bytes: Bytes,
        overwrite: bool,
    ) -> Result<ImageAsset, AssetError> {
        validate_file_name(file_name)?;
        if !is_image_file(file_name) {
            return Err(AssetError::UnsupportedFileType { file_name: file_name.to_string() });
        }

        let key = ModelKey::new(user_id.clone(), model_name);
        let _lock = self.lock_file(&key, file_name).await;

        let hash = content_hash(&bytes);
        let existing = self.find(&key, file_name);
        match &existing {
            Some(_) if !overwrite => {
                return Err(AssetError::Duplicate { file_name: file_name.to_string() });
            },
            Some(current) if current.content_hash == hash => {
                debug!("[AssetRegistry] {}/{} unchanged, skipping upload", key, file_name);
                return Ok(current.clone());
            },
            _ => {},
        }

        let replacing = existing.is_some();
        if !replacing {
            self.ledger.reserve(user_id, Resource::Photos, 1).await?;
        }

        let path = storage_path(user_id, model_name, file_name);
        let content_type = content_type_for(file_name);
        let size_bytes = bytes.len() as u64;
        let stored = retry_transient(&self.retry, "storage.put", || {
            self.storage.put(&path, bytes.clone(), content_type, true)
        })
        .await;

        let url = match stored {
            Ok(url) => url,
            Err(e) => {
                if !replacing {
                    self.ledger.release(user_id, Resource::Photos, 1).await;
                }
                warn!("[AssetRegistry] Upload of {}/{} failed: {}", key, file_name, e);
                return Err(AssetError::StorageUnavailable { message: e.to_string() });
            },
        };

        let now = Utc::now();
        let asset = ImageAsset {
            user_id: user_id.clone(),
            model_name: model_name.to_string(),
            file_name: file_name.to_string(),
            storage_path: path,
            url,
            size_bytes,
            content_hash: hash,
            uploaded_at: existing.as_ref().map_or(now, |current| current.uploaded_at),
            replaced_at: replacing.then_some(now),
        };
        {
            let mut list = self.assets.entry(key.clone()).or_default();
            match list.iter().position(|a| a.file_name == file_name) {
                Some(index) => list[index] = asset.clone(),
                None => list.push(asset.clone()),
            }
        }
        self.persist(&key).await;

        info!(
            "[AssetRegistry] {} {}/{} ({} bytes)",
            if replacing { "Replaced" } else { "Uploaded" },
            key,
            file_name,
            size_bytes
        );
        Ok(asset)
    }

    /// Remove one asset from storage and the registry, returning its photo unit.
    pub async fn delete(
        &self,
        user_id: &UserId,
        model_name: &str,
        file_name: &str,
    ) -> Result<ImageAsset, AssetError> {
        let key = ModelKey::new(user_id.clone(), model_name);
        let _lock = self.lock_file(&key, file_name).await;

        let asset = self
            .find(&key, file_name)
            .ok_or_else(|| AssetError::NotFound { file_name: file_name.to_string() })?;

        let removed =
            retry_transient(&self.retry, "storage.remove", || self.storage.remove(&asset.storage_path))
                .await;
        match removed {
            Ok(()) | Err(CollaboratorError::NotFound { .. }) => {},
            Err(e) => {
                warn!("[AssetRegistry] Delete of {}/{} failed: {}", key, file_name, e);
                return Err(AssetError::StorageUnavailable { message: e.to_string() });
            },
        }

        let now_empty = match self.assets.get_mut(&key) {
            Some(mut list) => {
                list.retain(|a| a.file_name != file_name);
                list.is_empty()
            },
            None => false,
        };
        if now_empty {
            self.assets.remove_if(&key, |_, list| list.is_empty());
        }
        self.ledger.release(user_id, Resource::Photos, 1).await;
        self.persist(&key).await;

        info!("[AssetRegistry] Deleted {}/{}", key, file_name);
        Ok(asset)
    }

    /// Delete every asset of a model. Stops at the first storage failure;
    /// assets deleted up to that point stay deleted.
    pub async fn delete_all(&self, key: &ModelKey) -> Result<usize, AssetError> {
        let file_names: Vec<String> = self
            .assets
            .get(key)
            .map(|list| list.iter().map(|a| a.file_name.clone()).collect())
            .unwrap_or_default();

        let mut deleted = 0;
        for file_name in file_names {
            match self.delete(&key.user_id, &key.model_name, &file_name).await {
                Ok(_) => deleted += 1,
                Err(AssetError::NotFound { .. }) => {},
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    /// Adopt image objects that exist under the model's storage prefix but
    /// are not on record, charging one photo unit each.
    pub async fn reconcile(
        &self,
        user_id: &UserId,
        model_name: &str,
    ) -> Result<ReconcileReport, AssetError> {
        let key = ModelKey::new(user_id.clone(), model_name);
        let prefix = model_prefix(user_id, model_name);
        let objects = retry_transient(&self.retry, "storage.list", || self.storage.list(&prefix))
            .await
            .map_err(|e| AssetError::StorageUnavailable { message: e.to_string() })?;

        let mut report = ReconcileReport::default();
        for object in objects {
            if !is_image_file(&object.name) || validate_file_name(&object.name).is_err() {
                report.skipped_non_images += 1;
                continue;
            }

            let _lock = self.lock_file(&key, &object.name).await;
            if self.find(&key, &object.name).is_some() {
                continue;
            }

            match self.ledger.reserve(user_id, Resource::Photos, 1).await {
                Ok(()) => {},
                Err(QuotaError::Exceeded { .. }) => {
                    report.quota_limited = true;
                    break;
                },
                Err(e) => return Err(e.into()),
            }

            let path = storage_path(user_id, model_name, &object.name);
            let asset = ImageAsset {
                user_id: user_id.clone(),
                model_name: model_name.to_string(),
                file_name: object.name.clone(),
                url: self.storage.public_url(&path),
                storage_path: path,
                size_bytes: object.size_bytes.unwrap_or(0),
                content_hash: String::new(),
                uploaded_at: object.updated_at.unwrap_or_else(Utc::now),
                replaced_at: None,
            };
            self.assets.entry(key.clone()).or_default().push(asset.clone());
            report.imported.push(asset);
        }

        if !report.imported.is_empty() {
            self.persist(&key).await;
            info!("[AssetRegistry] Adopted {} stored images for {}", report.imported.len(), key);
        }
        Ok(report)
    }

    /// Write the model's current asset list through to the repository.
    async fn persist(&self, key: &ModelKey) {
        let Some(repository) = &self.repository else {
            return;
        };
        let _guard = self.persist_lock.lock().await;
        let current: Vec<ImageAsset> =
            self.assets.get(key).map(|list| list.clone()).unwrap_or_default();
        if let Err(e) = repository.save_assets(key, &current).await {
            error!("[AssetRegistry] Failed to persist assets of {}: {}", key, e);
        }
    }
}
