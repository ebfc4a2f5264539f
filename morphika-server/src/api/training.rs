//! Training handlers: submit, list, status, poll, stop

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use morphika_types::models::TrainingJob;

use super::auth::AuthUser;
use super::error::ApiResult;
use crate::state::AppState;

pub async fn submit_training(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(model): Path<String>,
) -> ApiResult<(StatusCode, Json<TrainingJob>)> {
    let job = state.studio().submit_training(&user, &model).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn list_jobs(State(state): State<AppState>, AuthUser(user): AuthUser) -> Json<Vec<TrainingJob>> {
    Json(state.studio().list_jobs(&user))
}

pub async fn get_job(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<TrainingJob>> {
    Ok(Json(state.studio().training_job(&user, &job_id)?))
}

pub async fn poll_job(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<TrainingJob>> {
    Ok(Json(state.studio().poll_training(&user, &job_id).await?))
}

pub async fn stop_job(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<TrainingJob>> {
    Ok(Json(state.studio().stop_watching(&user, &job_id).await?))
}
