//! HTTP-facing error mapping for the API layer.
//!
//! Wraps `melodex_common::Error` for handlers, mapping each variant to a
//! status code per the flat `{"error": "..."}` response body (deliberately
//! simpler than the nested `{"error":{"code":...,"message":...}}` shape
//! grounded on in `wkmp-ai/src/error.rs`).

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use melodex_common::Error;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            Error::DatabaseLocked(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Cancelled => StatusCode::OK,
            Error::Database(_) | Error::Io(_) | Error::Config(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
