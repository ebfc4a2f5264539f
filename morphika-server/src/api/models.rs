//! Model handlers: list, create, get, delete, generate

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use morphika_types::models::{GenerationResult, Model};
use serde::Deserialize;

use super::auth::AuthUser;
use super::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateModelRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Body of `POST /api/models/:name/generate`; both fields fall back to config.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub num_outputs: Option<u32>,
}

pub async fn list_models(State(state): State<AppState>, AuthUser(user): AuthUser) -> Json<Vec<Model>> {
    Json(state.studio().list_models(&user))
}

pub async fn create_model(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateModelRequest>,
) -> ApiResult<(StatusCode, Json<Model>)> {
    let model = state.studio().create_model(&user, &request.name, request.description).await?;
    Ok((StatusCode::CREATED, Json(model)))
}

pub async fn get_model(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
) -> ApiResult<Json<Model>> {
    Ok(Json(state.studio().get_model(&user, &name)?))
}

pub async fn delete_model(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    state.studio().delete_model(&user, &name).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn generate_images(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(name): Path<String>,
    Json(request): Json<GenerateRequest>,
) -> ApiResult<Json<GenerationResult>> {
    let result = state
        .studio()
        .generate_images(&user, &name, request.prompt, request.num_outputs)
        .await?;
    Ok(Json(result))
}
