//! API Routes
//!
//! REST endpoints over the studio. Everything except the webhooks requires
//! `Authorization: Bearer <token>`.

mod assets;
mod auth;
mod error;
mod models;
mod training;
mod usage;
mod webhooks;

#[cfg(test)]
mod router_tests;

use axum::{
    extract::State,
    response::Json,
    routing::{get, post, put},
    Router,
};
use morphika_core::StudioStats;
use serde::Serialize;

use auth::AuthUser;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        // Status
        .route("/status", get(get_status))
        // Plans & usage
        .route("/plans", get(usage::list_plans))
        .route("/usage", get(usage::get_usage))
        // Models
        .route("/models", get(models::list_models).post(models::create_model))
        .route("/models/:name", get(models::get_model).delete(models::delete_model))
        // Assets
        .route("/models/:name/assets", get(assets::list_assets))
        .route("/models/:name/assets/sync", post(assets::sync_assets))
        .route(
            "/models/:name/assets/:file",
            put(assets::upload_asset).delete(assets::delete_asset),
        )
        // Training
        .route("/models/:name/training", post(training::submit_training))
        .route("/models/:name/generate", post(models::generate_images))
        .route("/training", get(training::list_jobs))
        .route("/training/:job_id", get(training::get_job))
        .route("/training/:job_id/poll", post(training::poll_job))
        .route("/training/:job_id/stop", post(training::stop_job))
        // Callbacks
        .route("/webhooks/training", post(webhooks::training_callback))
        .route("/billing/events", post(webhooks::billing_event))
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    #[serde(flatten)]
    stats: StudioStats,
}

async fn get_status(State(state): State<AppState>, AuthUser(_user): AuthUser) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
        stats: state.stats(),
    })
}
