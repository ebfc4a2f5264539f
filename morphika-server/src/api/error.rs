//! JSON error responses: `{ "error": <reason>, "message": <text> }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use morphika_types::{ErrorReason, TypedError};
use serde::Serialize;

pub const fn status_for(reason: ErrorReason) -> StatusCode {
    match reason {
        ErrorReason::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
        ErrorReason::DuplicateModel
        | ErrorReason::DuplicateAsset
        | ErrorReason::TrainingInProgress
        | ErrorReason::ModelNotTrained => StatusCode::CONFLICT,
        ErrorReason::InsufficientAssets => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorReason::StorageUnavailable | ErrorReason::TrainingBackendUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        },
        ErrorReason::GenerationFailed => StatusCode::BAD_GATEWAY,
        ErrorReason::TrainingTimedOut => StatusCode::GATEWAY_TIMEOUT,
        ErrorReason::Unauthenticated => StatusCode::UNAUTHORIZED,
        ErrorReason::NotFound => StatusCode::NOT_FOUND,
        ErrorReason::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorReason::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorReason,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub reason: ErrorReason,
    pub message: String,
}

impl ApiError {
    pub fn new(reason: ErrorReason, message: impl Into<String>) -> Self {
        Self { reason, message: message.into() }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::Unauthenticated, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorReason::InvalidInput, message)
    }
}

impl From<TypedError> for ApiError {
    fn from(err: TypedError) -> Self {
        Self { reason: err.reason(), message: err.message() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(self.reason);
        if status.is_server_error() {
            tracing::warn!("[API] {} {}: {}", status.as_u16(), self.reason, self.message);
        }
        (status, Json(ErrorBody { error: self.reason, message: self.message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
