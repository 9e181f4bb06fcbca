use axum::{
    body::Body,
    extract::{Query, State, rejection::QueryRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tokio::time::Instant;
use tracing::{Instrument, Span, debug, field, info, info_span, warn};
use uuid::Uuid;

use super::dto::DownloadQuery;
use super::model::{OutputFormat, SourceToken};
use super::selector::{direct_spec, normalize, select};
use crate::common::error::AppError;
use crate::common::filename::{file_name, sanitize};
use crate::common::response::{ApiError, ErrorBody};
use crate::infrastructure::process::tools::Tool;
use crate::state::AppState;
use crate::workers::transcoder::{PipelineState, TranscodeSpec, Transcoder};

/// Stream the converted file for a source token
/// Errors found before the first byte are returned as JSON; later failures
/// abort the connection.
#[utoipa::path(
    get,
    path = "/api/download",
    params(DownloadQuery),
    responses(
        (status = 200, description = "Media stream (audio/mpeg or video/mp4)"),
        (status = 400, description = "Missing, invalid or expired source", body = ErrorBody),
        (status = 422, description = "No usable stream", body = ErrorBody),
        (status = 502, description = "Upstream or transcode failure", body = ErrorBody),
        (status = 503, description = "Transcoder not installed", body = ErrorBody),
        (status = 504, description = "Transcode timeout", body = ErrorBody)
    ),
    tag = "Media"
)]
pub async fn download(
    State(state): State<AppState>,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("download", %request_id, platform = field::Empty);

    match serve(state, query).instrument(span.clone()).await {
        Ok(response) => response,
        Err(e) => span.in_scope(|| ApiError(e).into_response()),
    }
}

async fn serve(
    state: AppState,
    query: Result<Query<DownloadQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let deadline = Instant::now() + state.config.download_timeout;
    let Query(query) = query.map_err(|e| AppError::InvalidRequest(e.body_text()))?;

    let token = state.tokens.decode(query.source.as_deref().unwrap_or_default())?;
    let format = token.format();
    let platform = token.platform();
    Span::current().record("platform", platform.as_str());
    let stem = sanitize(query.title.as_deref().unwrap_or_default(), platform, format);
    debug!(state = %PipelineState::Idle, %platform, %format, "download accepted");

    let body = match token {
        SourceToken::Tiktok {
            url,
            transcode: false,
            ..
        } => proxy(&state, &url, deadline).await?,
        SourceToken::Tiktok {
            url,
            transcode: true,
            format,
        } => transcode(&state, direct_spec(&url, format)?, deadline).await?,
        SourceToken::Youtube { video_id, format } => {
            debug!(state = %PipelineState::ResolvingStreams, "re-resolving {}", video_id);
            let output = tokio::time::timeout_at(deadline, state.youtube.extract(&video_id, format))
                .await
                .map_err(|_| AppError::TranscodeTimeout)??;
            let streams = normalize(&output);
            let spec = select(&streams, format)?;
            transcode(&state, spec, deadline).await?
        }
    };

    info!("⬇️ Streaming {}", file_name(&stem, format));
    attachment(body, &stem, format)
}

/// Forwards an already-final media file.
async fn proxy(state: &AppState, url: &str, deadline: Instant) -> Result<Body, AppError> {
    let response = state
        .http
        .get(url)
        .timeout(deadline.saturating_duration_since(Instant::now()))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        warn!("Media host answered {}", status);
        return Err(AppError::UpstreamUnavailable(format!(
            "media host returned {}",
            status
        )));
    }

    debug!(state = %PipelineState::Streaming, "proxying media host response");
    Ok(Body::from_stream(response.bytes_stream()))
}

async fn transcode(state: &AppState, spec: TranscodeSpec, deadline: Instant) -> Result<Body, AppError> {
    let ffmpeg = state.tools.require(Tool::Ffmpeg)?;
    let session = Transcoder::new(ffmpeg).start(&spec, deadline)?;
    let stream = session.output.begin().await?;
    Ok(Body::from_stream(stream))
}

fn attachment(body: Body, stem: &str, format: OutputFormat) -> Result<Response, AppError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name(stem, format)),
        )
        .header(header::CACHE_CONTROL, "no-store")
        .body(body)
        .map_err(|e| AppError::Internal(format!("failed to build response: {}", e)))
}
