//! Download-phase tests: token validation, the proxy path, and the
//! transcode path driven by fake `yt-dlp` and `ffmpeg` scripts.

#![cfg(unix)]

mod common;

use std::path::Path;
use std::time::Duration;

use axum::http::{StatusCode, header};
use http_body_util::BodyExt;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use clipdrop::modules::media::model::{OutputFormat, SourceToken};
use clipdrop::modules::media::token::SourceTokenCodec;
use common::{TestHarness, body_bytes, body_json, fake_extractor, fake_tool};

const VIDEO_ID: &str = "dQw4w9WgXcQ";

fn download_uri(harness: &TestHarness, token: &SourceToken, title: &str) -> String {
    let source = harness.state.tokens.encode(token).unwrap();
    format!("/api/download?source={source}&title={title}")
}

fn youtube(format: OutputFormat) -> SourceToken {
    SourceToken::Youtube {
        format,
        video_id: VIDEO_ID.to_string(),
    }
}

fn split_streams(dir: &Path) -> std::path::PathBuf {
    fake_extractor(
        dir,
        &json!({
            "id": VIDEO_ID,
            "title": "Never Gonna Give You Up",
            "requested_formats": [
                { "url": "https://rr1.example/video", "vcodec": "avc1.640028", "acodec": "none",
                  "http_headers": { "User-Agent": "Mozilla/5.0" } },
                { "url": "https://rr1.example/audio", "vcodec": "none", "acodec": "mp4a.40.2" }
            ]
        }),
    )
}

// ---------------------------------------------------------------------------
// Token validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_source_is_rejected() {
    let harness = TestHarness::new();
    for uri in ["/api/download", "/api/download?source=", "/api/download?title=x"] {
        let resp = harness.get(uri).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body_json(resp).await["code"], "MISSING_SOURCE", "{uri}");
    }
}

#[tokio::test]
async fn corrupted_source_is_invalid() {
    let harness = TestHarness::new();
    let resp = harness.get("/api/download?source=definitely-not-a-token").await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["code"], "INVALID_SOURCE");
}

#[tokio::test]
async fn token_from_another_secret_is_invalid() {
    let harness = TestHarness::new();
    let foreign = SourceTokenCodec::new("some-other-secret", Duration::from_secs(60))
        .encode(&youtube(OutputFormat::Mp3))
        .unwrap();

    let resp = harness.get(&format!("/api/download?source={foreign}")).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["code"], "INVALID_SOURCE");
}

// ---------------------------------------------------------------------------
// Direct proxy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn direct_media_is_proxied_with_attachment_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fake-mp4-payload".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let token = SourceToken::Tiktok {
        format: OutputFormat::Mp4,
        url: format!("{}/media/clip.mp4", server.uri()),
        transcode: false,
    };

    let resp = harness.get(&download_uri(&harness, &token, "My%20Clip%21")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"My-Clip.mp4\""
    );
    assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(body_bytes(resp).await, b"fake-mp4-payload");
}

#[tokio::test]
async fn untrusted_title_is_resanitized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let token = SourceToken::Tiktok {
        format: OutputFormat::Mp3,
        url: format!("{}/a.mp3", server.uri()),
        transcode: false,
    };

    let resp = harness
        .get(&download_uri(&harness, &token, "..%2F..%2Fetc%2Fpasswd%22%0D%0A"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
    assert_eq!(disposition, "attachment; filename=\"etcpasswd.mp3\"");
}

#[tokio::test]
async fn failing_media_host_is_upstream_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let harness = TestHarness::new();
    let token = SourceToken::Tiktok {
        format: OutputFormat::Mp4,
        url: format!("{}/gone.mp4", server.uri()),
        transcode: false,
    };

    let resp = harness.get(&download_uri(&harness, &token, "x")).await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(resp).await["code"], "UPSTREAM_UNAVAILABLE");
}

#[tokio::test]
async fn flagged_direct_audio_goes_through_transcoder() {
    let harness = TestHarness::with_config(|config, dir| {
        config.ffmpeg_path = fake_tool(dir, "ffmpeg", "echo \"$@\"");
    });
    let token = SourceToken::Tiktok {
        format: OutputFormat::Mp3,
        url: "https://cdn.example/sound.m4a".into(),
        transcode: true,
    };

    let resp = harness.get(&download_uri(&harness, &token, "sound")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "audio/mpeg");

    let args = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(args.contains("-i https://cdn.example/sound.m4a"), "{args}");
    assert!(args.contains("-vn -c:a libmp3lame"), "{args}");
}

// ---------------------------------------------------------------------------
// Identifier resolution + transcode
// ---------------------------------------------------------------------------

#[tokio::test]
async fn youtube_mp4_muxes_both_inputs() {
    let harness = TestHarness::with_config(|config, dir| {
        config.ytdlp_path = split_streams(dir);
        config.ffmpeg_path = fake_tool(dir, "ffmpeg", "echo \"$@\"");
    });

    let resp = harness
        .get(&download_uri(&harness, &youtube(OutputFormat::Mp4), "Never-Gonna"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "video/mp4");
    assert!(resp.headers().get(header::CONTENT_LENGTH).is_none());

    let args = String::from_utf8(body_bytes(resp).await).unwrap();
    assert!(args.contains("-i https://rr1.example/video"), "{args}");
    assert!(args.contains("-i https://rr1.example/audio"), "{args}");
    assert!(args.contains("User-Agent: Mozilla/5.0"), "{args}");
    assert!(args.contains("-map 0:v:0 -map 1:a:0"), "{args}");
    assert!(args.contains("-c:v copy"), "{args}");
    assert!(args.contains("-c:a copy"), "{args}");
    assert!(args.trim_end().ends_with("-f mp4 pipe:1"), "{args}");
}

#[tokio::test]
async fn youtube_mp3_streams_transcoder_output() {
    let harness = TestHarness::with_config(|config, dir| {
        config.ytdlp_path = fake_extractor(
            dir,
            &json!({ "id": VIDEO_ID, "url": "https://rr1.example/audio", "vcodec": "none", "acodec": "opus" }),
        );
        config.ffmpeg_path = fake_tool(dir, "ffmpeg", "printf 'ID3-fake-mp3'");
    });

    let resp = harness
        .get(&download_uri(&harness, &youtube(OutputFormat::Mp3), "song"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"song.mp3\""
    );
    assert_eq!(body_bytes(resp).await, b"ID3-fake-mp3");
}

#[tokio::test]
async fn no_usable_stream_is_resolution_empty() {
    let harness = TestHarness::with_config(|config, dir| {
        config.ytdlp_path = fake_extractor(
            dir,
            &json!({ "id": VIDEO_ID, "requested_formats": [
                { "url": "https://rr1.example/video", "vcodec": "vp9", "acodec": "none" }
            ]}),
        );
        config.ffmpeg_path = fake_tool(dir, "ffmpeg", "exit 0");
    });

    let resp = harness
        .get(&download_uri(&harness, &youtube(OutputFormat::Mp3), "x"))
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(resp).await["code"], "STREAM_RESOLUTION_EMPTY");
}

#[tokio::test]
async fn missing_transcoder_is_tool_unavailable() {
    let harness = TestHarness::with_config(|config, dir| {
        config.ytdlp_path = split_streams(dir);
    });

    let resp = harness
        .get(&download_uri(&harness, &youtube(OutputFormat::Mp4), "x"))
        .await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["code"], "TOOL_UNAVAILABLE");
}

#[tokio::test]
async fn failure_before_first_byte_is_structured() {
    let harness = TestHarness::with_config(|config, dir| {
        config.ytdlp_path = split_streams(dir);
        config.ffmpeg_path = fake_tool(dir, "ffmpeg", "echo 'Invalid data found' >&2\nexit 1");
    });

    let resp = harness
        .get(&download_uri(&harness, &youtube(OutputFormat::Mp4), "x"))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    let json = body_json(resp).await;
    assert_eq!(json["code"], "TRANSCODE_FAILED");
    assert!(!json["error"].as_str().unwrap().contains("Invalid data"));
}

#[tokio::test]
async fn empty_successful_output_is_a_failure() {
    let harness = TestHarness::with_config(|config, dir| {
        config.ytdlp_path = split_streams(dir);
        config.ffmpeg_path = fake_tool(dir, "ffmpeg", "exit 0");
    });

    let resp = harness
        .get(&download_uri(&harness, &youtube(OutputFormat::Mp4), "x"))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(resp).await["code"], "TRANSCODE_FAILED");
}

#[tokio::test]
async fn failure_after_first_byte_aborts_body() {
    let harness = TestHarness::with_config(|config, dir| {
        config.ytdlp_path = split_streams(dir);
        config.ffmpeg_path = fake_tool(dir, "ffmpeg", "printf 'partial'\nexit 3");
    });

    let resp = harness
        .get(&download_uri(&harness, &youtube(OutputFormat::Mp4), "x"))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.into_body().collect().await.is_err());
}

#[tokio::test]
async fn stalled_transcode_hits_download_deadline() {
    let harness = TestHarness::with_config(|config, dir| {
        config.ytdlp_path = split_streams(dir);
        config.ffmpeg_path = fake_tool(dir, "ffmpeg", "exec sleep 5");
        config.download_timeout = Duration::from_millis(300);
    });

    let resp = harness
        .get(&download_uri(&harness, &youtube(OutputFormat::Mp4), "x"))
        .await;
    assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(resp).await["code"], "TRANSCODE_TIMEOUT");
}
