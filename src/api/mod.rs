//! API modules for the REST surface

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod rest;

/// API error response body
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl IntoResponse for crate::Error {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            crate::Error::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            crate::Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            crate::Error::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            crate::Error::Upstream(_) | crate::Error::Pool(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "UPSTREAM_ERROR")
            }
            crate::Error::Database(_) | crate::Error::Config(_) | crate::Error::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = ApiError {
            code: code.to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
