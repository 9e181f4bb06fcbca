use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::common::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Tiktok,
    Youtube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Tiktok => "tiktok",
            Platform::Youtube => "youtube",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Mp4,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Mp4 => "mp4",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Mp4 => "video/mp4",
        }
    }

    /// `audio` or `video`, used in fallback filenames.
    pub fn kind(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio",
            OutputFormat::Mp4 => "video",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(OutputFormat::Mp3),
            "mp4" => Ok(OutputFormat::Mp4),
            other => Err(AppError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Resolution state carried by the client between the convert and download
/// phases. Identifier-based platforms store the id, never a stream URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "platform", rename_all = "lowercase")]
pub enum SourceToken {
    Tiktok {
        format: OutputFormat,
        url: String,
        #[serde(default)]
        transcode: bool,
    },
    Youtube {
        format: OutputFormat,
        #[serde(rename = "videoId")]
        video_id: String,
    },
}

impl SourceToken {
    pub fn platform(&self) -> Platform {
        match self {
            SourceToken::Tiktok { .. } => Platform::Tiktok,
            SourceToken::Youtube { .. } => Platform::Youtube,
        }
    }

    pub fn format(&self) -> OutputFormat {
        match self {
            SourceToken::Tiktok { format, .. } | SourceToken::Youtube { format, .. } => *format,
        }
    }
}

/// What the resolve phase learned about a video.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMedia {
    pub id: String,
    pub title: String,
    pub author: String,
    pub cover: Option<String>,
    pub duration: Option<f64>,
    pub token: SourceToken,
}

/// A codec tag as reported by the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecTag {
    Present(String),
    /// Explicitly reported as `none`: the track is not there.
    Absent,
    /// Missing or empty: nothing is known.
    Unknown,
}

impl CodecTag {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => CodecTag::Unknown,
            Some(tag) if tag.eq_ignore_ascii_case("none") => CodecTag::Absent,
            Some(tag) => CodecTag::Present(tag.to_ascii_lowercase()),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, CodecTag::Present(_))
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, CodecTag::Absent)
    }

    pub fn starts_with_any(&self, prefixes: &[&str]) -> bool {
        match self {
            CodecTag::Present(tag) => prefixes.iter().any(|p| tag.starts_with(p)),
            _ => false,
        }
    }
}

/// One candidate stream returned by the adaptive-source resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStreamDescriptor {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub video_codec: CodecTag,
    pub audio_codec: CodecTag,
}

impl MediaStreamDescriptor {
    pub fn new(url: impl Into<String>, video_codec: &str, audio_codec: &str) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
            video_codec: CodecTag::parse(Some(video_codec)),
            audio_codec: CodecTag::parse(Some(audio_codec)),
        }
    }
}
