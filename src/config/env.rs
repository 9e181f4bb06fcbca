use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    TiktokMetadataEndpoint,
    ApiTimeoutMs,
    YtDlpTimeoutMs,
    DownloadTimeoutMs,
    FfmpegPath,
    YtDlpPath,
    YtDlpCookiesFile,
    YtDlpPotProviderUrl,
    SourceTokenSecret,
    SourceTokenTtlSecs,
    AllowWatermarked,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::TiktokMetadataEndpoint => "TIKTOK_METADATA_ENDPOINT",
            EnvKey::ApiTimeoutMs => "API_TIMEOUT_MS",
            EnvKey::YtDlpTimeoutMs => "YTDLP_TIMEOUT_MS",
            EnvKey::DownloadTimeoutMs => "DOWNLOAD_TIMEOUT_MS",
            EnvKey::FfmpegPath => "FFMPEG_PATH",
            EnvKey::YtDlpPath => "YTDLP_PATH",
            EnvKey::YtDlpCookiesFile => "YTDLP_COOKIES_FILE",
            EnvKey::YtDlpPotProviderUrl => "YTDLP_POT_PROVIDER_URL",
            EnvKey::SourceTokenSecret => "SOURCE_TOKEN_SECRET",
            EnvKey::SourceTokenTtlSecs => "SOURCE_TOKEN_TTL_SECS",
            EnvKey::AllowWatermarked => "ALLOW_WATERMARKED",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

/// Unset or blank values are treated as absent.
pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str())
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}
