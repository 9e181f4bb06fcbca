use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::common::error::AppError;
use crate::infrastructure::process::tools::{Tool, ToolRegistry};
use crate::modules::media::classifier::canonical_watch_url;
use crate::modules::media::model::{OutputFormat, ResolvedMedia, SourceToken};

/// Single JSON document printed by `yt-dlp --dump-single-json`. Only the
/// fields used here are modelled; the rest is ignored.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ExtractorOutput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub is_live: Option<bool>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub http_headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub requested_formats: Option<Vec<ExtractorFormat>>,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ExtractorFormat {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub http_headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
}

/// Identifier-resolution variant: runs the extraction tool against the
/// canonical watch URL. Convert time only confirms the video resolves;
/// stream URLs are fetched again at download time.
#[derive(Clone)]
pub struct YoutubeResolver {
    tools: Arc<ToolRegistry>,
    timeout: Duration,
    cookies_file: Option<PathBuf>,
    pot_provider_url: Option<String>,
}

impl YoutubeResolver {
    pub fn new(
        tools: Arc<ToolRegistry>,
        timeout: Duration,
        cookies_file: Option<PathBuf>,
        pot_provider_url: Option<String>,
    ) -> Self {
        Self {
            tools,
            timeout,
            cookies_file,
            pot_provider_url,
        }
    }

    pub fn format_selector(format: OutputFormat) -> &'static str {
        match format {
            OutputFormat::Mp3 => "bestaudio/best",
            OutputFormat::Mp4 => "bv*[vcodec^=avc1]+ba[acodec^=mp4a]/bv*+ba/b",
        }
    }

    pub fn build_args(&self, video_id: &str, format: OutputFormat) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--dump-single-json".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
            "-f".into(),
            Self::format_selector(format).into(),
        ];

        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".into());
            args.push(cookies.to_string_lossy().into_owned());
        }
        if let Some(provider) = &self.pot_provider_url {
            args.push("--extractor-args".into());
            args.push(format!("youtubepot-bgutilhttp:base_url={}", provider));
        }

        args.push(canonical_watch_url(video_id));
        args
    }

    /// Runs the tool and parses its JSON. The child is killed if the
    /// timeout elapses.
    pub async fn extract(&self, video_id: &str, format: OutputFormat) -> Result<ExtractorOutput, AppError> {
        let program = self.tools.require(Tool::YtDlp)?;
        let args = self.build_args(video_id, format);
        debug!("Running {} {:?}", program.display(), args);

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AppError::ExtractorFailed(format!("failed to start yt-dlp: {}", e)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| AppError::ExtractorFailed(format!("yt-dlp io error: {}", e)))?
            }
            Err(_) => {
                warn!("yt-dlp timed out after {:?} for {}", self.timeout, video_id);
                return Err(AppError::UpstreamTimeout);
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp exited with {} for {}: {}", output.status, video_id, stderr.trim());
            return Err(classify_failure(&stderr, output.status.code()));
        }

        parse_output(&output.stdout)
    }

    pub async fn resolve(&self, video_id: &str, format: OutputFormat) -> Result<ResolvedMedia, AppError> {
        let output = self.extract(video_id, format).await?;

        if output.is_live.unwrap_or(false) {
            return Err(AppError::FormatUnavailable("live streams cannot be downloaded".into()));
        }

        let title = non_empty(output.title).unwrap_or_else(|| "YouTube Video".to_string());
        let author = non_empty(output.uploader)
            .or_else(|| non_empty(output.channel))
            .unwrap_or_else(|| "YouTube Creator".to_string());

        Ok(ResolvedMedia {
            id: non_empty(output.id).unwrap_or_else(|| video_id.to_string()),
            title,
            author,
            cover: non_empty(output.thumbnail),
            duration: output.duration,
            token: SourceToken::Youtube {
                format,
                video_id: video_id.to_string(),
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

pub fn parse_output(stdout: &[u8]) -> Result<ExtractorOutput, AppError> {
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::MalformedUpstream("yt-dlp printed nothing".into()));
    }
    serde_json::from_str(text)
        .map_err(|e| AppError::MalformedUpstream(format!("yt-dlp output is not JSON: {}", e)))
}

/// Maps the tool's stderr onto the failure taxonomy.
pub fn classify_failure(stderr: &str, code: Option<i32>) -> AppError {
    let lower = stderr.to_lowercase();

    if lower.contains("not a bot") || lower.contains("sign in to confirm") {
        AppError::BotChallenge
    } else if lower.contains("requested format is not available") {
        AppError::FormatUnavailable("no stream matches the requested format".into())
    } else if lower.contains("private video")
        || lower.contains("video unavailable")
        || lower.contains("has been removed")
        || lower.contains("not available")
    {
        AppError::VideoUnavailable(last_line(stderr))
    } else {
        let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
        AppError::ExtractorFailed(format!("exit {}: {}", code, last_line(stderr)))
    }
}

fn last_line(text: &str) -> String {
    text.lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or_default()
        .trim()
        .to_string()
}
