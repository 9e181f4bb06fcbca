use std::path::PathBuf;
use std::time::Duration;

use rand::{Rng, distr::Alphanumeric};
use serde::Deserialize;
use tracing::warn;

use crate::config::env::{self, EnvKey};

const DEFAULT_TIKTOK_ENDPOINT: &str = "https://www.tikwm.com/api/";

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub server_port: u16,
    pub tiktok_endpoint: String,
    pub api_timeout: Duration,
    pub ytdlp_timeout: Duration,
    pub download_timeout: Duration,
    pub ffmpeg_path: PathBuf,
    pub ytdlp_path: PathBuf,
    pub ytdlp_cookies_file: Option<PathBuf>,
    pub ytdlp_pot_provider_url: Option<String>,
    pub token_secret: String,
    pub token_ttl: Duration,
    pub allow_watermarked: bool,
}

impl AppConfig {
    pub fn new() -> Self {
        let token_secret = match env::get_opt(EnvKey::SourceTokenSecret) {
            Some(secret) => secret,
            None => {
                warn!(
                    "{} is not set, download links will not survive a restart",
                    EnvKey::SourceTokenSecret.as_str()
                );
                random_secret()
            }
        };

        Self {
            server_port: env::get_parsed(EnvKey::ServerPort, 3000),
            tiktok_endpoint: env::get_or(EnvKey::TiktokMetadataEndpoint, DEFAULT_TIKTOK_ENDPOINT),
            api_timeout: Duration::from_millis(env::get_parsed(EnvKey::ApiTimeoutMs, 15_000)),
            ytdlp_timeout: Duration::from_millis(env::get_parsed(EnvKey::YtDlpTimeoutMs, 45_000)),
            download_timeout: Duration::from_millis(env::get_parsed(
                EnvKey::DownloadTimeoutMs,
                600_000,
            )),
            ffmpeg_path: PathBuf::from(env::get_or(EnvKey::FfmpegPath, "ffmpeg")),
            ytdlp_path: PathBuf::from(env::get_or(EnvKey::YtDlpPath, "yt-dlp")),
            ytdlp_cookies_file: env::get_opt(EnvKey::YtDlpCookiesFile).map(PathBuf::from),
            ytdlp_pot_provider_url: env::get_opt(EnvKey::YtDlpPotProviderUrl),
            token_secret,
            token_ttl: Duration::from_secs(env::get_parsed(EnvKey::SourceTokenTtlSecs, 21_600)),
            allow_watermarked: env::get_parsed(EnvKey::AllowWatermarked, false),
        }
    }
}

impl Default for AppConfig {
    /// Baseline used by tests: local tool names, short timeouts, fixed secret.
    fn default() -> Self {
        Self {
            server_port: 3000,
            tiktok_endpoint: DEFAULT_TIKTOK_ENDPOINT.to_string(),
            api_timeout: Duration::from_secs(15),
            ytdlp_timeout: Duration::from_secs(45),
            download_timeout: Duration::from_secs(600),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ytdlp_path: PathBuf::from("yt-dlp"),
            ytdlp_cookies_file: None,
            ytdlp_pot_provider_url: None,
            token_secret: "clipdrop-test-secret".to_string(),
            token_ttl: Duration::from_secs(21_600),
            allow_watermarked: false,
        }
    }
}

fn random_secret() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(48)
        .map(char::from)
        .collect()
}
