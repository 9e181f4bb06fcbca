use std::collections::BTreeMap;

use super::model::{CodecTag, MediaStreamDescriptor, OutputFormat};
use super::resolver::ExtractorOutput;
use crate::common::error::AppError;
use crate::workers::transcoder::{CodecAction, StreamPlan, TranscodeInput, TranscodeSpec};

const MP4_VIDEO_COPY: &[&str] = &["avc1", "avc3", "h264"];
const MP4_AUDIO_COPY: &[&str] = &["mp4a", "aac"];

/// Flattens both extractor shapes (separate requested formats, or a single
/// combined stream) into one ordered list. Entries without a URL are dropped.
pub fn normalize(output: &ExtractorOutput) -> Vec<MediaStreamDescriptor> {
    let describe = |url: &Option<String>,
                    headers: &Option<BTreeMap<String, String>>,
                    vcodec: &Option<String>,
                    acodec: &Option<String>| {
        let url = url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        Some(MediaStreamDescriptor {
            url: url.to_string(),
            headers: headers.clone().unwrap_or_default(),
            video_codec: CodecTag::parse(vcodec.as_deref()),
            audio_codec: CodecTag::parse(acodec.as_deref()),
        })
    };

    match output.requested_formats.as_deref() {
        Some(formats) if !formats.is_empty() => formats
            .iter()
            .filter_map(|f| describe(&f.url, &f.http_headers, &f.vcodec, &f.acodec))
            .collect(),
        _ => describe(&output.url, &output.http_headers, &output.vcodec, &output.acodec)
            .into_iter()
            .collect(),
    }
}

/// Copy is only chosen for codecs the target container carries natively.
pub fn video_action(tag: &CodecTag) -> CodecAction {
    if tag.starts_with_any(MP4_VIDEO_COPY) {
        CodecAction::Copy
    } else {
        CodecAction::Encode
    }
}

pub fn audio_action(tag: &CodecTag, format: OutputFormat) -> CodecAction {
    match format {
        OutputFormat::Mp3 => CodecAction::Encode,
        OutputFormat::Mp4 if tag.starts_with_any(MP4_AUDIO_COPY) => CodecAction::Copy,
        OutputFormat::Mp4 => CodecAction::Encode,
    }
}

/// Picks inputs for the requested output and decides copy vs re-encode per
/// stream. Fails with [`AppError::StreamResolutionEmpty`] when nothing
/// satisfies the format's minimum requirement.
pub fn select(streams: &[MediaStreamDescriptor], format: OutputFormat) -> Result<TranscodeSpec, AppError> {
    match format {
        OutputFormat::Mp3 => select_audio(streams),
        OutputFormat::Mp4 => select_video(streams),
    }
}

fn select_audio(streams: &[MediaStreamDescriptor]) -> Result<TranscodeSpec, AppError> {
    let source = streams
        .iter()
        .find(|s| s.audio_codec.is_present())
        .or_else(|| streams.iter().find(|s| !s.audio_codec.is_absent()))
        .ok_or(AppError::StreamResolutionEmpty)?;

    Ok(TranscodeSpec {
        inputs: vec![TranscodeInput::from(source)],
        video: None,
        audio: Some(StreamPlan {
            input: 0,
            action: audio_action(&source.audio_codec, OutputFormat::Mp3),
            optional: false,
        }),
        format: OutputFormat::Mp3,
    })
}

fn select_video(streams: &[MediaStreamDescriptor]) -> Result<TranscodeSpec, AppError> {
    let video = streams
        .iter()
        .find(|s| s.video_codec.is_present() && s.audio_codec.is_present())
        .or_else(|| streams.iter().find(|s| s.video_codec.is_present()))
        .or_else(|| streams.iter().find(|s| !s.video_codec.is_absent()))
        .ok_or(AppError::StreamResolutionEmpty)?;

    let mut inputs = vec![TranscodeInput::from(video)];
    let video_plan = StreamPlan {
        input: 0,
        action: video_action(&video.video_codec),
        optional: false,
    };

    let audio_plan = if video.audio_codec.is_absent() {
        streams
            .iter()
            .find(|s| s.audio_codec.is_present() && s.video_codec.is_absent())
            .map(|audio| {
                inputs.push(TranscodeInput::from(audio));
                StreamPlan {
                    input: 1,
                    action: audio_action(&audio.audio_codec, OutputFormat::Mp4),
                    optional: false,
                }
            })
    } else {
        Some(StreamPlan {
            input: 0,
            action: audio_action(&video.audio_codec, OutputFormat::Mp4),
            optional: !video.audio_codec.is_present(),
        })
    };

    Ok(TranscodeSpec {
        inputs,
        video: Some(video_plan),
        audio: audio_plan,
        format: OutputFormat::Mp4,
    })
}

/// Spec for a single direct URL whose codecs are unknown.
pub fn direct_spec(url: &str, format: OutputFormat) -> Result<TranscodeSpec, AppError> {
    let stream = MediaStreamDescriptor {
        url: url.to_string(),
        headers: BTreeMap::new(),
        video_codec: CodecTag::Unknown,
        audio_codec: CodecTag::Unknown,
    };
    select(std::slice::from_ref(&stream), format)
}
