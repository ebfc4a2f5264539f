//! Bearer token extractor resolving the calling user.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use morphika_types::models::UserId;

use super::error::ApiError;
use crate::state::AppState;

/// The authenticated caller. Handlers taking this reject requests without a
/// valid `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts);
        if token.is_none() {
            return Err(ApiError::unauthenticated("Missing bearer token"));
        }
        let user_id = state.studio().authenticate(token).await?;
        Ok(Self(user_id))
    }
}
