use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use morphika_types::models::{BackendStatus, TrainingPhase};
use serde_json::{json, Value};

use super::webhooks::BILLING_SECRET_HEADER;
use crate::router::build_router;
use crate::test_helpers::{png, test_app, TestApp, BILLING_SECRET, OTHER_TOKEN, TEST_TOKEN};

fn server_for(app: &TestApp) -> TestServer {
    TestServer::new(build_router(app.state.clone())).expect("test server")
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {token}")).expect("header value")
}

#[tokio::test]
async fn test_health_is_public() {
    let app = test_app();
    let response = server_for(&app).get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_api_requires_bearer_token() {
    let app = test_app();
    let server = server_for(&app);

    let response = server.get("/api/usage").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"], "unauthenticated");

    let response = server
        .get("/api/usage")
        .add_header(header::AUTHORIZATION, bearer("not-a-user"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response =
        server.get("/api/usage").add_header(header::AUTHORIZATION, bearer(TEST_TOKEN)).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["tier"], "starter");
    assert_eq!(body["limits"]["max_models"], 5);
}

#[tokio::test]
async fn test_starter_training_flow() {
    let app = test_app();
    let server = server_for(&app);
    let auth = bearer(TEST_TOKEN);

    let response = server
        .post("/api/models")
        .add_header(header::AUTHORIZATION, auth.clone())
        .json(&json!({ "name": "chair" }))
        .await;
    response.assert_status(StatusCode::CREATED);

    for i in 0..8 {
        server
            .put(&format!("/api/models/chair/assets/img{i}.jpg"))
            .add_header(header::AUTHORIZATION, auth.clone())
            .bytes(png(i))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = server
        .post("/api/models/chair/training")
        .add_header(header::AUTHORIZATION, auth.clone())
        .await;
    response.assert_status(StatusCode::ACCEPTED);
    let job: Value = response.json();
    assert_eq!(job["state"], "queued");
    let job_id = job["job_id"].as_str().expect("job id").to_string();

    // The callback body claims success; only the backend's answer counts.
    app.backend.set_status(&job_id, BackendStatus::new(TrainingPhase::Processing));
    let response = server
        .post("/api/webhooks/training")
        .json(&json!({ "id": job_id, "status": "succeeded" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["state"], "running");

    app.backend.set_status(&job_id, BackendStatus {
        phase: TrainingPhase::Succeeded,
        artifact_url: Some("https://weights.test/chair.tar".to_string()),
        error: None,
    });
    let response = server
        .post(&format!("/api/training/{job_id}/poll"))
        .add_header(header::AUTHORIZATION, auth.clone())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["state"], "succeeded");
    assert_eq!(body["artifact_url"], "https://weights.test/chair.tar");

    let response = server.get("/api/models/chair").add_header(header::AUTHORIZATION, auth.clone()).await;
    let model: Value = response.json();
    assert_eq!(model["training_state"], "succeeded");
    assert_eq!(model["assets"].as_array().map(Vec::len), Some(8));

    let response = server.get("/api/usage").add_header(header::AUTHORIZATION, auth.clone()).await;
    let usage: Value = response.json();
    assert_eq!(usage["consumed"], json!({ "models": 1, "photos": 8, "trainings": 1 }));

    let response = server.get("/api/training").add_header(header::AUTHORIZATION, auth).await;
    let jobs: Value = response.json();
    assert_eq!(jobs.as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_sixth_model_exceeds_starter_quota() {
    let app = test_app();
    let server = server_for(&app);
    let auth = bearer(TEST_TOKEN);

    for i in 0..5 {
        server
            .post("/api/models")
            .add_header(header::AUTHORIZATION, auth.clone())
            .json(&json!({ "name": format!("model-{i}") }))
            .await
            .assert_status(StatusCode::CREATED);
    }

    let response = server
        .post("/api/models")
        .add_header(header::AUTHORIZATION, auth.clone())
        .json(&json!({ "name": "model-5" }))
        .await;
    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: Value = response.json();
    assert_eq!(body["error"], "quota_exceeded");

    let usage: Value =
        server.get("/api/usage").add_header(header::AUTHORIZATION, auth).await.json();
    assert_eq!(usage["consumed"]["models"], 5);
}

#[tokio::test]
async fn test_duplicate_upload_and_overwrite() {
    let app = test_app();
    app.seed_model("chair", 1).await;
    let server = server_for(&app);
    let auth = bearer(TEST_TOKEN);

    let response = server
        .put("/api/models/chair/assets/img0.png")
        .add_header(header::AUTHORIZATION, auth.clone())
        .bytes(png(99))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "duplicate_asset");

    server
        .put("/api/models/chair/assets/img0.png")
        .add_query_param("overwrite", true)
        .add_header(header::AUTHORIZATION, auth.clone())
        .bytes(png(99))
        .await
        .assert_status(StatusCode::CREATED);

    let usage: Value =
        server.get("/api/usage").add_header(header::AUTHORIZATION, auth).await.json();
    assert_eq!(usage["consumed"]["photos"], 1);
}

#[tokio::test]
async fn test_delete_refused_while_training() {
    let app = test_app();
    app.seed_model("chair", 8).await;
    let server = server_for(&app);
    let auth = bearer(TEST_TOKEN);

    server
        .post("/api/models/chair/training")
        .add_header(header::AUTHORIZATION, auth.clone())
        .await
        .assert_status(StatusCode::ACCEPTED);

    let response =
        server.delete("/api/models/chair").add_header(header::AUTHORIZATION, auth.clone()).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "training_in_progress");

    let response = server
        .delete("/api/models/chair/assets/img0.png")
        .add_header(header::AUTHORIZATION, auth)
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "training_in_progress");
    assert_eq!(app.storage.object_count(), 8);
}

#[tokio::test]
async fn test_generate_route_after_training() {
    let app = test_app();
    app.seed_model("chair", 8).await;
    let server = server_for(&app);
    let auth = bearer(TEST_TOKEN);

    let response = server
        .post("/api/models/chair/generate")
        .add_header(header::AUTHORIZATION, auth.clone())
        .json(&json!({}))
        .await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "model_not_trained");

    let job: Value = server
        .post("/api/models/chair/training")
        .add_header(header::AUTHORIZATION, auth.clone())
        .await
        .json();
    let job_id = job["job_id"].as_str().expect("job id").to_string();
    app.backend.set_status(&job_id, BackendStatus {
        phase: TrainingPhase::Succeeded,
        artifact_url: Some("https://weights.test/chair.tar".to_string()),
        error: None,
    });
    server
        .post(&format!("/api/training/{job_id}/poll"))
        .add_header(header::AUTHORIZATION, auth.clone())
        .await
        .assert_status_ok();

    let response = server
        .post("/api/models/chair/generate")
        .add_header(header::AUTHORIZATION, auth.clone())
        .json(&json!({ "num_outputs": 9 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/models/chair/generate")
        .add_header(header::AUTHORIZATION, auth.clone())
        .json(&json!({ "prompt": "oak chair in a loft", "num_outputs": 2 }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["model_name"], "chair");
    assert_eq!(body["prompt"], "oak chair in a loft");
    assert_eq!(body["images"].as_array().map(Vec::len), Some(2));
    assert_eq!(app.generator.requests()[0].weights, "https://weights.test/chair.tar");

    app.generator.fail_predictions(Some("nsfw content detected"));
    let response = server
        .post("/api/models/chair/generate")
        .add_header(header::AUTHORIZATION, auth)
        .json(&json!({}))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"], "generation_failed");
}

#[tokio::test]
async fn test_backend_outage_rolls_back_training_unit() {
    let app = test_app();
    app.seed_model("chair", 8).await;
    app.backend.fail_next(5);
    let server = server_for(&app);
    let auth = bearer(TEST_TOKEN);

    let response = server
        .post("/api/models/chair/training")
        .add_header(header::AUTHORIZATION, auth.clone())
        .await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"], "training_backend_unavailable");

    let usage: Value =
        server.get("/api/usage").add_header(header::AUTHORIZATION, auth.clone()).await.json();
    assert_eq!(usage["consumed"]["trainings"], 0);
    let model: Value =
        server.get("/api/models/chair").add_header(header::AUTHORIZATION, auth).await.json();
    assert_eq!(model["training_state"], "idle");
}

#[tokio::test]
async fn test_jobs_are_not_visible_to_other_users() {
    let app = test_app();
    app.seed_model("chair", 8).await;
    let server = server_for(&app);

    let job: Value = server
        .post("/api/models/chair/training")
        .add_header(header::AUTHORIZATION, bearer(TEST_TOKEN))
        .await
        .json();
    let job_id = job["job_id"].as_str().expect("job id");

    let response = server
        .get(&format!("/api/training/{job_id}"))
        .add_header(header::AUTHORIZATION, bearer(OTHER_TOKEN))
        .await;
    response.assert_status_not_found();

    let response = server
        .post(&format!("/api/training/{job_id}/stop"))
        .add_header(header::AUTHORIZATION, bearer(OTHER_TOKEN))
        .await;
    response.assert_status_not_found();
}

#[tokio::test]
async fn test_sync_route_adopts_stored_images() {
    let app = test_app();
    app.seed_model("chair", 0).await;
    app.storage.insert_raw("models/ana/chair/found.png", png(7));
    let server = server_for(&app);

    let response = server
        .post("/api/models/chair/assets/sync")
        .add_header(header::AUTHORIZATION, bearer(TEST_TOKEN))
        .await;
    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["imported"].as_array().map(Vec::len), Some(1));
    assert_eq!(report["imported"][0]["file_name"], "found.png");
}

#[tokio::test]
async fn test_billing_route_checks_secret() {
    let app = test_app();
    let server = server_for(&app);
    let event = json!({ "type": "tier_changed", "user_id": "ana", "tier": "business" });

    server.post("/api/billing/events").json(&event).await.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/api/billing/events")
        .add_header(
            HeaderName::from_static(BILLING_SECRET_HEADER),
            HeaderValue::from_static(BILLING_SECRET),
        )
        .json(&event)
        .await;
    response.assert_status_ok();
    let usage: Value = response.json();
    assert_eq!(usage["tier"], "business");
}

#[tokio::test]
async fn test_status_reports_counts() {
    let app = test_app();
    app.seed_model("chair", 3).await;
    let server = server_for(&app);

    let status: Value =
        server.get("/api/status").add_header(header::AUTHORIZATION, bearer(TEST_TOKEN)).await.json();
    assert_eq!(status["models"], 1);
    assert_eq!(status["assets"], 3);
    assert_eq!(status["accounts"], 1);
}
