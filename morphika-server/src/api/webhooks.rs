//! Callbacks from external services. Neither route takes a bearer token.
//!
//! Training callbacks only name a job; its status is re-read from the backend.
//! Billing events must carry the shared secret in [`BILLING_SECRET_HEADER`].

use axum::{
    extract::State,
    http::HeaderMap,
    response::Json,
};
use morphika_types::models::{BillingEvent, TrainingState, UsageSnapshot};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::error::{ApiError, ApiResult};
use crate::state::AppState;

pub const BILLING_SECRET_HEADER: &str = "x-morphika-billing-secret";

#[derive(Debug, Deserialize)]
pub struct TrainingCallback {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct TrainingCallbackResponse {
    pub job_id: String,
    pub state: TrainingState,
}

pub async fn training_callback(
    State(state): State<AppState>,
    Json(callback): Json<TrainingCallback>,
) -> ApiResult<Json<TrainingCallbackResponse>> {
    tracing::debug!("[Webhook] Training callback for {}", callback.id);
    let job_state = state.studio().handle_training_callback(&callback.id).await?;
    Ok(Json(TrainingCallbackResponse { job_id: callback.id, state: job_state }))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

pub async fn billing_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<BillingEvent>,
) -> ApiResult<Json<UsageSnapshot>> {
    let provided = headers.get(BILLING_SECRET_HEADER).and_then(|v| v.to_str().ok());
    let authorized = match (state.billing_secret(), provided) {
        (Some(expected), Some(provided)) => constant_time_compare(expected, provided),
        _ => false,
    };
    if !authorized {
        tracing::warn!("[Webhook] Rejected billing event for {}", event.user_id());
        return Err(ApiError::unauthenticated("Invalid billing secret"));
    }

    tracing::info!("[Webhook] Billing event for {}", event.user_id());
    Ok(Json(state.studio().handle_billing_event(event).await?))
}
