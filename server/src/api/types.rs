//! Shared API types

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::data::sqlite::SqliteError;

/// Maximum items returned by the latest-spans endpoint
pub const MAX_LATEST_LIMIT: i64 = 500;
/// Default items returned by the latest-spans endpoint
pub const DEFAULT_LATEST_LIMIT: i64 = 50;

/// Standard API error response
#[derive(Debug)]
pub enum ApiError {
    BadRequest { message: String },
    Internal { message: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest { message } => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<SqliteError> for ApiError {
    fn from(err: SqliteError) -> Self {
        tracing::error!(error = %err, "Database error serving API request");
        ApiError::Internal {
            message: "database error".to_string(),
        }
    }
}
