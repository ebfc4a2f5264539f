//! Uploaded image assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::UserId;
use super::model::{AssetRef, ModelKey};

/// Extensions accepted as training images.
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Check the file extension against [`ALLOWED_IMAGE_EXTENSIONS`], ignoring case.
pub fn is_image_file(file_name: &str) -> bool {
    file_name.rsplit_once('.').is_some_and(|(stem, ext)| {
        !stem.is_empty()
            && ALLOWED_IMAGE_EXTENSIONS.iter().any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}

/// Object storage prefix holding every asset of a model.
pub fn model_prefix(user_id: &UserId, model_name: &str) -> String {
    format!("models/{}/{}", user_id, model_name)
}

/// Object storage path of a single asset.
pub fn storage_path(user_id: &UserId, model_name: &str, file_name: &str) -> String {
    format!("{}/{}", model_prefix(user_id, model_name), file_name)
}

/// An uploaded training image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageAsset {
    pub user_id: UserId,
    pub model_name: String,
    pub file_name: String,
    pub storage_path: String,
    /// Public URL handed to the training backend
    pub url: String,
    pub size_bytes: u64,
    /// SHA-256 of the content, lowercase hex
    pub content_hash: String,
    /// First upload; an overwrite keeps it, so list order is stable
    pub uploaded_at: DateTime<Utc>,
    /// Last overwrite, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_at: Option<DateTime<Utc>>,
}

impl ImageAsset {
    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.user_id.clone(), self.model_name.clone())
    }

    pub fn to_ref(&self) -> AssetRef {
        AssetRef { file_name: self.file_name.clone(), url: self.url.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_allow_list() {
        assert!(is_image_file("chair.jpg"));
        assert!(is_image_file("chair.JPEG"));
        assert!(is_image_file("a.b.png"));
        assert!(is_image_file("anim.gif"));
        assert!(!is_image_file("notes.txt"));
        assert!(!is_image_file("png"));
        assert!(!is_image_file(".png"));
        assert!(!is_image_file("photo.webp"));
    }

    #[test]
    fn test_storage_path_layout() {
        let user = UserId::from("u1");
        assert_eq!(storage_path(&user, "chair", "1.jpg"), "models/u1/chair/1.jpg");
    }
}
