use axum::{extract::State, response::Json};
use morphika_types::models::{PlanEntry, UsageSnapshot};

use super::auth::AuthUser;
use crate::state::AppState;

pub async fn get_usage(State(state): State<AppState>, AuthUser(user): AuthUser) -> Json<UsageSnapshot> {
    Json(state.studio().usage(&user).await)
}

pub async fn list_plans(State(state): State<AppState>, AuthUser(_user): AuthUser) -> Json<Vec<PlanEntry>> {
    Json(state.studio().plans())
}
