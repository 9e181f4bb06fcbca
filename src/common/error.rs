use axum::http::StatusCode;
use thiserror::Error;

/// Every failure a request can end in. Each variant maps to exactly one
/// HTTP status and one stable machine-readable code.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("A video URL is required.")]
    MissingUrl,

    #[error("The URL is not from a supported platform: {0}")]
    UnsupportedUrl(String),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("The source parameter is missing.")]
    MissingSource,

    #[error("The source parameter is invalid or corrupted.")]
    InvalidSource,

    #[error("The download link has expired, convert the video again.")]
    SourceExpired,

    #[error("The video is private, removed or does not exist: {0}")]
    VideoUnavailable(String),

    #[error("The requested format is not available for this video: {0}")]
    FormatUnavailable(String),

    #[error("No playable stream could be resolved for this video.")]
    StreamResolutionEmpty,

    #[error("The platform asked for an anti-automation check, try again later.")]
    BotChallenge,

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("upstream did not answer in time")]
    UpstreamTimeout,

    #[error("extractor failed: {0}")]
    ExtractorFailed(String),

    #[error("required tool is not installed: {0}")]
    ToolUnavailable(&'static str),

    #[error("transcode failed: {0}")]
    TranscodeFailed(String),

    #[error("transcode exceeded its time limit")]
    TranscodeTimeout,

    #[error("malformed upstream response: {0}")]
    MalformedUpstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingUrl
            | AppError::UnsupportedUrl(_)
            | AppError::UnsupportedFormat(_)
            | AppError::InvalidRequest(_)
            | AppError::MissingSource
            | AppError::InvalidSource
            | AppError::SourceExpired => StatusCode::BAD_REQUEST,
            AppError::VideoUnavailable(_) => StatusCode::NOT_FOUND,
            AppError::FormatUnavailable(_) | AppError::StreamResolutionEmpty => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::BotChallenge => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamUnavailable(_)
            | AppError::ExtractorFailed(_)
            | AppError::TranscodeFailed(_) => StatusCode::BAD_GATEWAY,
            AppError::ToolUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamTimeout | AppError::TranscodeTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::MalformedUpstream(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingUrl => "MISSING_URL",
            AppError::UnsupportedUrl(_) => "UNSUPPORTED_URL",
            AppError::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            AppError::InvalidRequest(_) => "INVALID_REQUEST",
            AppError::MissingSource => "MISSING_SOURCE",
            AppError::InvalidSource => "INVALID_SOURCE",
            AppError::SourceExpired => "SOURCE_EXPIRED",
            AppError::VideoUnavailable(_) => "VIDEO_UNAVAILABLE",
            AppError::FormatUnavailable(_) => "FORMAT_UNAVAILABLE",
            AppError::StreamResolutionEmpty => "STREAM_RESOLUTION_EMPTY",
            AppError::BotChallenge => "BOT_CHALLENGE",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            AppError::ExtractorFailed(_) => "EXTRACTOR_FAILED",
            AppError::ToolUnavailable(_) => "TOOL_UNAVAILABLE",
            AppError::TranscodeFailed(_) => "TRANSCODE_FAILED",
            AppError::TranscodeTimeout => "TRANSCODE_TIMEOUT",
            AppError::MalformedUpstream(_) => "MALFORMED_UPSTREAM",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show a client. Anything whose detail comes from an
    /// upstream or a child process hides it behind a fixed sentence; the
    /// detail only reaches the logs.
    pub fn public_message(&self) -> String {
        match self {
            AppError::UnsupportedUrl(_) => "The URL is not from a supported platform.".to_string(),
            AppError::VideoUnavailable(_) => {
                "The video is private, removed or does not exist.".to_string()
            }
            AppError::FormatUnavailable(_) => {
                "The requested format is not available for this video.".to_string()
            }
            AppError::UpstreamUnavailable(_) | AppError::ExtractorFailed(_) => {
                "Could not fetch the video information right now.".to_string()
            }
            AppError::UpstreamTimeout => {
                "The platform took too long to answer, try again in a moment.".to_string()
            }
            AppError::ToolUnavailable(_) => {
                "The conversion service is not available right now.".to_string()
            }
            AppError::TranscodeFailed(_) => "The conversion did not complete.".to_string(),
            AppError::TranscodeTimeout => "The conversion took too long.".to_string(),
            AppError::MalformedUpstream(_) | AppError::Internal(_) => {
                "An unexpected error occurred.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::UpstreamTimeout
        } else if err.is_decode() {
            AppError::MalformedUpstream(err.to_string())
        } else {
            AppError::UpstreamUnavailable(err.to_string())
        }
    }
}
