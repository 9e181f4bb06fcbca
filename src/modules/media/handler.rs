use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use super::dto::{ConvertRequest, ConvertResponse, HealthResponse, ToolStatus};
use super::service::MediaService;
use crate::common::error::AppError;
use crate::common::response::{ApiError, ApiSuccess, ErrorBody};
use crate::infrastructure::process::tools::Tool;
use crate::state::AppState;

/// Resolve a TikTok or YouTube URL into a downloadable source
#[utoipa::path(
    post,
    path = "/api/convert",
    request_body = ConvertRequest,
    responses(
        (status = 200, description = "Media resolved", body = ConvertResponse),
        (status = 400, description = "Missing or unsupported URL or format", body = ErrorBody),
        (status = 404, description = "Video unavailable", body = ErrorBody),
        (status = 422, description = "Requested format not available", body = ErrorBody),
        (status = 429, description = "Platform bot challenge", body = ErrorBody),
        (status = 502, description = "Upstream unavailable", body = ErrorBody),
        (status = 504, description = "Upstream timeout", body = ErrorBody)
    ),
    tag = "Media"
)]
pub async fn convert(
    State(state): State<AppState>,
    payload: Result<Json<ConvertRequest>, JsonRejection>,
) -> Result<ApiSuccess<ConvertResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| AppError::InvalidRequest(e.body_text()))?;
    let response = MediaService::convert(state, payload).await?;
    Ok(ApiSuccess(response, StatusCode::OK))
}

/// Service and external tool status
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    ),
    tag = "Media"
)]
pub async fn health(State(state): State<AppState>) -> ApiSuccess<HealthResponse> {
    let timestamp = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();

    ApiSuccess(
        HealthResponse {
            status: "OK".to_string(),
            timestamp,
            tools: ToolStatus {
                ffmpeg: state.tools.is_available(Tool::Ffmpeg),
                yt_dlp: state.tools.is_available(Tool::YtDlp),
            },
        },
        StatusCode::OK,
    )
}
