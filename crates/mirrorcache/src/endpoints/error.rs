use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use mirrorcache_service::caching::CacheError;

/// The response sent back on errors.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiErrorResponse {
    /// Creates an error response with the given status code and message.
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Response {
        let body = Json(ApiErrorResponse {
            error: Some(message.into()),
        });
        (status, body).into_response()
    }
}

/// An error for the endpoint handlers which converts into an [`ApiErrorResponse`].
#[derive(Debug)]
pub struct ResponseError {
    status: StatusCode,
    err: anyhow::Error,
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        ApiErrorResponse::with_status(self.status, self.err.to_string())
    }
}

impl From<CacheError> for ResponseError {
    fn from(err: CacheError) -> Self {
        let status = match &err {
            CacheError::NotFound => StatusCode::NOT_FOUND,
            CacheError::VerifyFailed => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::Timeout(_)
            | CacheError::DownloadError(_)
            | CacheError::LengthMismatch { .. }
            | CacheError::CommitFailed(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            err: err.into(),
        }
    }
}

impl From<std::io::Error> for ResponseError {
    fn from(err: std::io::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err: err.into(),
        }
    }
}

impl From<axum::http::Error> for ResponseError {
    fn from(err: axum::http::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            err: err.into(),
        }
    }
}
