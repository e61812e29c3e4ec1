use axum::{
    Json,
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use streamhub_types::api::ApiResponse;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// The one error every handler returns. Rendered as the failure envelope
/// with `data: null`.
#[derive(Debug, Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::new(self.status.as_u16(), serde_json::Value::Null, self.message);
        (self.status, Json(body)).into_response()
    }
}

/// Store and media failures surface here. Constraint violations that slip
/// past the explicit existence checks are still conflicts.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if streamhub_db::is_constraint_violation(&err) {
            return Self::conflict("User with this username or email already exists");
        }
        error!("Internal error: {:#}", err);
        Self::internal("Internal server error")
    }
}

/// Body rejections never leak extractor status codes or serde diagnostics.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected JSON body ({}): {}", rejection.status(), rejection.body_text());
        Self::bad_request("Invalid request body")
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        debug!("Rejected multipart body ({}): {}", rejection.status(), rejection.body_text());
        Self::bad_request("Invalid multipart body")
    }
}
