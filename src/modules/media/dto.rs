use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::model::{OutputFormat, Platform};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConvertRequest {
    /// TikTok or YouTube page URL.
    #[serde(default)]
    #[validate(length(min = 1, message = "A video URL is required."))]
    pub url: String,
    /// `mp3` (default) or `mp4`. Kept as text so unknown values get a
    /// proper error code instead of a JSON rejection.
    #[schema(example = "mp3")]
    pub format: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConvertResponse {
    pub success: bool,
    pub media: MediaInfo,
    pub meta: MetaInfo,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MediaInfo {
    pub title: String,
    pub author: String,
    pub cover: Option<String>,
    pub duration: Option<f64>,
    pub format: OutputFormat,
    pub file_name: String,
    pub download_path: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetaInfo {
    pub id: String,
    pub platform: Platform,
    pub original_url: String,
    pub thumbnail: Option<String>,
    pub video_duration: Option<f64>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    /// Opaque token returned by the convert call.
    pub source: Option<String>,
    /// Filename hint; sanitized again before use.
    pub title: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ToolStatus {
    pub ffmpeg: bool,
    #[serde(rename = "ytDlp")]
    pub yt_dlp: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub tools: ToolStatus,
}
