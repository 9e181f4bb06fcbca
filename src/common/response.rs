use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::common::error::AppError;

/// Body of every failed API call.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>, code: &str) -> Self {
        Self {
            success: false,
            error: message.into(),
            code: code.to_string(),
        }
    }
}

pub struct ApiSuccess<T>(pub T, pub StatusCode);

impl<T> IntoResponse for ApiSuccess<T>
where
    T: Serialize,
{
    fn into_response(self) -> Response {
        let (body, status) = (self.0, self.1);
        (status, Json(body)).into_response()
    }
}

pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = self.0;
        let status = err.status();

        if status.is_server_error() {
            tracing::error!(status = %status, code = err.code(), error = %err, "request failed");
        } else {
            tracing::info!(status = %status, code = err.code(), "request rejected: {}", err);
        }

        let body = ErrorBody::new(err.public_message(), err.code());
        (status, Json(body)).into_response()
    }
}
