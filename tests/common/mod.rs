//! Shared harness for integration tests.
//!
//! Builds the full router around an [`AppConfig`] whose external tools are
//! small shell scripts written to a temporary directory.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use clipdrop::config::settings::AppConfig;
use clipdrop::state::AppState;

pub const MISSING_TOOL: &str = "/nonexistent/clipdrop-missing-tool";

pub struct TestHarness {
    pub state: AppState,
    pub app: Router,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(|_, _| {})
    }

    /// `configure` gets a config whose tools point at missing binaries, plus
    /// a scratch directory to install fake ones in with [`fake_tool`].
    pub fn with_config(configure: impl FnOnce(&mut AppConfig, &Path)) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let mut config = AppConfig {
            ffmpeg_path: PathBuf::from(MISSING_TOOL),
            ytdlp_path: PathBuf::from(MISSING_TOOL),
            ..AppConfig::default()
        };
        configure(&mut config, dir.path());

        let state = AppState::new(config, reqwest::Client::new());
        let app = clipdrop::app::create_app(state.clone());
        Self { state, app, dir }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.expect("router failed")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

/// Writes an executable `#!/bin/sh` script named `name` into `dir`.
pub fn fake_tool(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{script}\n")).expect("failed to write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("failed to chmod");
    path
}

/// A fake extractor that prints `json` and exits 0.
pub fn fake_extractor(dir: &Path, json: &serde_json::Value) -> PathBuf {
    fake_tool(dir, "yt-dlp", &format!("cat <<'JSON'\n{json}\nJSON"))
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).expect("body is not JSON")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}
