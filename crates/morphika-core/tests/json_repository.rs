#![allow(unused_crate_dependencies)]
#![allow(clippy::tests_outside_test_module, reason = "integration tests live in tests/ dir")]
#![allow(clippy::expect_used, reason = "integration test: panics are the assertion mechanism")]

use std::sync::Arc;

use bytes::Bytes;
use morphika_core::collaborators::{
    Collaborators, MemoryImageGenerator, MemoryStorage, MemoryTrainingBackend, StaticBilling,
    StaticIdentity,
};
use morphika_core::{JsonRepository, StateRepository, Studio};
use morphika_types::models::{
    AppConfig, BackendStatus, PlanTier, TrainingPhase, TrainingState, UserId,
};
use tempfile::TempDir;

struct Instance {
    studio: Studio,
    backend: Arc<MemoryTrainingBackend>,
}

/// A studio over `dir`, sharing `storage` with earlier instances the way
/// a restarted server shares the bucket.
fn instance(dir: &TempDir, storage: &Arc<MemoryStorage>) -> Instance {
    let backend = Arc::new(MemoryTrainingBackend::new());
    let collaborators = Collaborators {
        identity: Arc::new(StaticIdentity::permissive()),
        storage: storage.clone(),
        training: backend.clone(),
        generator: Arc::new(MemoryImageGenerator::new()),
        billing: Arc::new(StaticBilling::new()),
    };
    let repository: Arc<dyn StateRepository> = Arc::new(JsonRepository::new(dir.path()));
    Instance { studio: Studio::new(collaborators, &AppConfig::default(), Some(repository)), backend }
}

#[tokio::test]
async fn test_state_survives_restart() {
    let dir = TempDir::new().expect("tempdir");
    let storage = Arc::new(MemoryStorage::new("https://cdn.test"));
    let user = UserId::new("ana@example.com");

    let job_id = {
        let first = instance(&dir, &storage);
        first.studio.create_model(&user, "My Cats", None).await.expect("create");
        first.studio.create_model(&user, "Dogs", None).await.expect("create");
        for i in 0..8 {
            first
                .studio
                .upload_asset(&user, "My Cats", &format!("cat {i}.jpg"), Bytes::from(vec![i; 16]), false)
                .await
                .expect("upload");
        }
        first.studio.delete_model(&user, "Dogs").await.expect("delete");
        first.studio.submit_training(&user, "My Cats").await.expect("submit").job_id
    };

    let second = instance(&dir, &storage);
    let report = second.studio.restore().await.expect("restore");
    assert_eq!(report.accounts, 1);
    assert_eq!(report.models, 1);
    assert_eq!(report.assets, 8);
    assert_eq!(report.jobs, 1);

    let usage = second.studio.usage(&user).await;
    assert_eq!(usage.tier, PlanTier::Starter);
    assert_eq!(usage.consumed.models, 1);
    assert_eq!(usage.consumed.photos, 8);
    assert_eq!(usage.consumed.trainings, 1);

    let model = second.studio.get_model(&user, "My Cats").expect("model restored");
    assert_eq!(model.assets.len(), 8);
    assert_eq!(model.training_state, TrainingState::Queued);
    assert_eq!(model.job_id.as_deref(), Some(job_id.as_str()));
    assert!(second.studio.get_model(&user, "Dogs").is_err());

    let watched = second.studio.training().watched_jobs();
    assert_eq!(watched.len(), 1);
    assert_eq!(watched[0].job_id, job_id);

    // The restored job keeps driving the restored model.
    second.backend.set_status(&job_id, BackendStatus {
        phase: TrainingPhase::Succeeded,
        artifact_url: Some("https://weights.test/cats.tar".to_string()),
        error: None,
    });
    second.studio.handle_training_callback(&job_id).await.expect("callback");
    let model = second.studio.get_model(&user, "My Cats").expect("model");
    assert_eq!(model.training_state, TrainingState::Succeeded);
    assert_eq!(model.artifact_url.as_deref(), Some("https://weights.test/cats.tar"));

    let third = instance(&dir, &storage);
    third.studio.restore().await.expect("restore");
    let job = third.studio.training_job(&user, &job_id).expect("job");
    assert_eq!(job.state, TrainingState::Succeeded);
    assert!(!job.watched);
}

#[tokio::test]
async fn test_corrupted_records_are_skipped() {
    let dir = TempDir::new().expect("tempdir");
    let storage = Arc::new(MemoryStorage::new("https://cdn.test"));
    let user = UserId::new("ana");

    {
        let first = instance(&dir, &storage);
        first.studio.create_model(&user, "Cats", None).await.expect("create");
    }

    let jobs_dir = dir.path().join("jobs");
    std::fs::create_dir_all(&jobs_dir).expect("mkdir");
    std::fs::write(jobs_dir.join("broken.json"), b"{ not json").expect("write");
    std::fs::write(jobs_dir.join("half.json.tmp"), b"{}").expect("write");

    let second = instance(&dir, &storage);
    let report = second.studio.restore().await.expect("restore tolerates bad files");
    assert_eq!(report.models, 1);
    assert_eq!(report.jobs, 0);
}

#[tokio::test]
async fn test_empty_directory_restores_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let storage = Arc::new(MemoryStorage::new("https://cdn.test"));
    let report = instance(&dir, &storage).studio.restore().await.expect("restore");
    assert_eq!(report.accounts + report.models + report.assets + report.jobs, 0);
}
