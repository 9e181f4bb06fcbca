use tracing::info;
use url::form_urlencoded;
use validator::Validate;

use super::classifier::{Classification, classify};
use super::dto::{ConvertRequest, ConvertResponse, MediaInfo, MetaInfo};
use super::model::OutputFormat;
use crate::common::error::AppError;
use crate::common::filename::{file_name, sanitize};
use crate::state::AppState;

pub struct MediaService;

impl MediaService {
    /// Resolve phase: classify the URL, ask the platform resolver for
    /// metadata and hand back a signed download path.
    pub async fn convert(state: AppState, req: ConvertRequest) -> Result<ConvertResponse, AppError> {
        req.validate().map_err(|_| AppError::MissingUrl)?;

        let url = req.url.trim();
        if url.is_empty() {
            return Err(AppError::MissingUrl);
        }

        let format = match req.format.as_deref() {
            Some(raw) => raw.parse::<OutputFormat>()?,
            None => OutputFormat::default(),
        };

        let resolved = match classify(url) {
            Classification::Tiktok => state.tiktok.resolve(url, format).await?,
            Classification::Youtube { video_id: Some(id) } => state.youtube.resolve(&id, format).await?,
            Classification::Youtube { video_id: None } => {
                return Err(AppError::UnsupportedUrl(
                    "no video identifier found in the YouTube URL".to_string(),
                ));
            }
            Classification::Unsupported => return Err(AppError::UnsupportedUrl(url.to_string())),
        };

        let platform = resolved.token.platform();
        let token = state.tokens.encode(&resolved.token)?;
        let stem = sanitize(&resolved.title, platform, format);

        info!("🎬 Resolved {} {} as {}", platform, resolved.id, format);

        Ok(ConvertResponse {
            success: true,
            media: MediaInfo {
                title: resolved.title,
                author: resolved.author,
                cover: resolved.cover.clone(),
                duration: resolved.duration,
                format,
                file_name: file_name(&stem, format),
                download_path: download_path(&token, &stem),
            },
            meta: MetaInfo {
                id: resolved.id,
                platform,
                original_url: url.to_string(),
                thumbnail: resolved.cover,
                video_duration: resolved.duration,
            },
        })
    }
}

pub fn download_path(token: &str, title: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("source", token)
        .append_pair("title", title)
        .finish();
    format!("/api/download?{}", query)
}
