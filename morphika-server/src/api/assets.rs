//! Asset handlers. Uploads take the raw image bytes as the request body.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use morphika_core::ReconcileReport;
use morphika_types::models::ImageAsset;
use serde::Deserialize;

use super::auth::AuthUser;
use super::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub overwrite: bool,
}

pub async fn list_assets(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(model): Path<String>,
) -> ApiResult<Json<Vec<ImageAsset>>> {
    Ok(Json(state.studio().list_assets(&user, &model)?))
}

pub async fn upload_asset(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((model, file)): Path<(String, String)>,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ImageAsset>)> {
    if body.is_empty() {
        return Err(ApiError::invalid_input("Request body is empty"));
    }
    let asset = state.studio().upload_asset(&user, &model, &file, body, query.overwrite).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

pub async fn delete_asset(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((model, file)): Path<(String, String)>,
) -> ApiResult<Json<ImageAsset>> {
    Ok(Json(state.studio().delete_asset(&user, &model, &file).await?))
}

pub async fn sync_assets(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(model): Path<String>,
) -> ApiResult<Json<ReconcileReport>> {
    Ok(Json(state.studio().sync_assets(&user, &model).await?))
}
