//! Test helpers for morphika-server unit tests.

use std::sync::Arc;

use axum::body::Bytes;
use morphika_core::collaborators::{
    Collaborators, MemoryImageGenerator, MemoryStorage, MemoryTrainingBackend, StaticBilling,
    StaticIdentity,
};
use morphika_core::Studio;
use morphika_types::models::{AppConfig, RetryConfig, UserId};

use crate::state::AppState;

pub const TEST_TOKEN: &str = "token-ana";
pub const OTHER_TOKEN: &str = "token-bob";
pub const TEST_USER: &str = "ana";
pub const BILLING_SECRET: &str = "billing-secret";

/// In-memory collaborators kept next to the state so tests can steer them.
pub struct TestApp {
    pub state: AppState,
    pub storage: Arc<MemoryStorage>,
    pub backend: Arc<MemoryTrainingBackend>,
    pub generator: Arc<MemoryImageGenerator>,
    pub billing: Arc<StaticBilling>,
}

impl TestApp {
    pub fn user(&self) -> UserId {
        UserId::new(TEST_USER)
    }

    /// Create `model` for the test user with `images` uploaded images.
    pub async fn seed_model(&self, model: &str, images: usize) {
        let studio = self.state.studio();
        let user = self.user();
        studio.create_model(&user, model, None).await.expect("create model");
        for i in 0..images {
            studio
                .upload_asset(&user, model, &format!("img{i}.png"), png(i), false)
                .await
                .expect("upload image");
        }
    }
}

/// Create an `AppState` over in-memory collaborators.
pub fn test_app() -> TestApp {
    let storage = Arc::new(MemoryStorage::new("https://cdn.test"));
    let backend = Arc::new(MemoryTrainingBackend::new());
    let generator = Arc::new(MemoryImageGenerator::new());
    let billing = Arc::new(StaticBilling::new());
    let collaborators = Collaborators {
        identity: Arc::new(
            StaticIdentity::new().with_user(TEST_TOKEN, TEST_USER).with_user(OTHER_TOKEN, "bob"),
        ),
        storage: storage.clone(),
        training: backend.clone(),
        generator: generator.clone(),
        billing: billing.clone(),
    };
    let config = AppConfig {
        retry: RetryConfig { max_attempts: 2, base_delay_ms: 1, max_delay_ms: 2 },
        ..AppConfig::default()
    };
    let studio = Arc::new(Studio::new(collaborators, &config, None));
    let state = AppState::new(studio, Some(BILLING_SECRET.to_string()));
    TestApp { state, storage, backend, generator, billing }
}

/// Distinct image bytes per `seed`.
pub fn png(seed: usize) -> Bytes {
    Bytes::from(format!("\u{89}PNG test image {seed}").into_bytes())
}
