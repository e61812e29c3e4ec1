use axum::{Json, http::StatusCode};
use serde::Serialize;

use streamhub_types::api::ApiResponse;

/// Success response wrapped in the standard envelope.
pub fn reply<T: Serialize>(
    status: StatusCode,
    data: T,
    message: &str,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (status, Json(ApiResponse::new(status.as_u16(), data, message)))
}

/// `{}` payload for operations with nothing to return.
pub fn empty() -> serde_json::Value {
    serde_json::json!({})
}
