use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::common::error::AppError;
use crate::modules::media::model::{OutputFormat, ResolvedMedia, SourceToken};

/// Audio container extensions that are not MP3 and need a transcode.
const NON_MP3_AUDIO: &[&str] = &["m4a", "aac", "mp4", "webm", "ogg", "opus"];

#[derive(Debug, Deserialize)]
struct ProviderResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<ProviderData>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderData {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    play: Option<String>,
    #[serde(default)]
    wmplay: Option<String>,
    #[serde(default)]
    hdplay: Option<String>,
    #[serde(default)]
    music: Option<String>,
    #[serde(default)]
    music_info: Option<MusicInfo>,
    #[serde(default)]
    author: Option<AuthorInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct MusicInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthorInfo {
    #[serde(default)]
    nickname: Option<String>,
}

/// Direct-resolution variant: one bounded POST to the metadata provider
/// yields an immediately fetchable media URL.
#[derive(Clone)]
pub struct TiktokResolver {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    allow_watermarked: bool,
}

impl TiktokResolver {
    pub fn new(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        timeout: Duration,
        allow_watermarked: bool,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
            allow_watermarked,
        }
    }

    pub async fn resolve(&self, url: &str, format: OutputFormat) -> Result<ResolvedMedia, AppError> {
        debug!("Querying metadata provider for {}", url);

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .form(&[("url", url), ("hd", "1")])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Metadata provider answered {}", status);
            return Err(AppError::UpstreamUnavailable(format!(
                "metadata provider returned {}",
                status
            )));
        }

        let payload: ProviderResponse = response.json().await?;
        self.interpret(payload, format)
    }

    fn interpret(&self, payload: ProviderResponse, format: OutputFormat) -> Result<ResolvedMedia, AppError> {
        if payload.code != 0 {
            let msg = payload.msg.unwrap_or_else(|| format!("provider code {}", payload.code));
            return Err(AppError::VideoUnavailable(msg));
        }
        let data = payload
            .data
            .ok_or_else(|| AppError::MalformedUpstream("success without data".to_string()))?;

        let (media_url, transcode) = match format {
            OutputFormat::Mp3 => {
                let music = non_empty(data.music.as_deref()).ok_or_else(|| {
                    AppError::FormatUnavailable("no audio track in provider response".into())
                })?;
                let media_url = self.absolute(music)?;
                let transcode = needs_audio_transcode(&media_url);
                (media_url, transcode)
            }
            OutputFormat::Mp4 => {
                let video = self.pick_video(&data)?;
                (self.absolute(video)?, false)
            }
        };

        let music_info = data.music_info.unwrap_or_default();
        let nickname = data.author.and_then(|a| a.nickname);

        let title = first_non_empty(&[data.title.as_deref(), music_info.title.as_deref()])
            .unwrap_or(match format {
                OutputFormat::Mp3 => "TikTok Audio",
                OutputFormat::Mp4 => "TikTok Video",
            })
            .to_string();

        let author = match format {
            OutputFormat::Mp3 => first_non_empty(&[music_info.author.as_deref(), nickname.as_deref()]),
            OutputFormat::Mp4 => first_non_empty(&[nickname.as_deref(), music_info.author.as_deref()]),
        }
        .unwrap_or("TikTok Creator")
        .to_string();

        let id = match data.id {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };

        Ok(ResolvedMedia {
            id,
            title,
            author,
            cover: non_empty(data.cover.as_deref()).map(str::to_string),
            duration: data.duration,
            token: SourceToken::Tiktok {
                format,
                url: media_url,
                transcode,
            },
        })
    }

    /// Watermark-free renditions first; the watermarked one only when allowed.
    fn pick_video<'a>(&self, data: &'a ProviderData) -> Result<&'a str, AppError> {
        if let Some(url) = first_non_empty(&[data.hdplay.as_deref(), data.play.as_deref()]) {
            return Ok(url);
        }
        match non_empty(data.wmplay.as_deref()) {
            Some(url) if self.allow_watermarked => Ok(url),
            Some(_) => Err(AppError::FormatUnavailable(
                "only a watermarked rendition is available".into(),
            )),
            None => Err(AppError::FormatUnavailable(
                "no video rendition in provider response".into(),
            )),
        }
    }

    /// The provider sometimes answers with paths relative to its own host.
    /// Only http(s) results are accepted; the URL ends up as an ffmpeg input.
    fn absolute(&self, media: &str) -> Result<String, AppError> {
        let url = match Url::parse(media) {
            Ok(url) => url,
            Err(_) => Url::parse(&self.endpoint)
                .and_then(|base| base.join(media))
                .map_err(|e| {
                    AppError::MalformedUpstream(format!("bad media url {}: {}", media, e))
                })?,
        };

        if !matches!(url.scheme(), "http" | "https") {
            warn!("Provider returned a {} media url", url.scheme());
            return Err(AppError::MalformedUpstream(format!(
                "unsupported media url scheme: {}",
                url.scheme()
            )));
        }
        Ok(url.to_string())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn first_non_empty<'a>(values: &[Option<&'a str>]) -> Option<&'a str> {
    values.iter().find_map(|v| non_empty(*v))
}

fn needs_audio_transcode(media_url: &str) -> bool {
    let Ok(url) = Url::parse(media_url) else {
        return false;
    };
    url.path()
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| NON_MP3_AUDIO.contains(&ext.as_str()))
}
