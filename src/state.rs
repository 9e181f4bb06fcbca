use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::process::tools::ToolRegistry;
use crate::modules::media::resolver::{TiktokResolver, YoutubeResolver};
use crate::modules::media::token::SourceTokenCodec;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub http: reqwest::Client,
    pub tools: Arc<ToolRegistry>,
    pub tokens: SourceTokenCodec,
    pub tiktok: TiktokResolver,
    pub youtube: YoutubeResolver,
}

impl AppState {
    pub fn new(config: AppConfig, http: reqwest::Client) -> Self {
        let tools = Arc::new(ToolRegistry::new(&config.ffmpeg_path, &config.ytdlp_path));
        let tokens = SourceTokenCodec::new(&config.token_secret, config.token_ttl);
        let tiktok = TiktokResolver::new(
            http.clone(),
            config.tiktok_endpoint.clone(),
            config.api_timeout,
            config.allow_watermarked,
        );
        let youtube = YoutubeResolver::new(
            tools.clone(),
            config.ytdlp_timeout,
            config.ytdlp_cookies_file.clone(),
            config.ytdlp_pot_provider_url.clone(),
        );

        Self {
            config,
            http,
            tools,
            tokens,
            tiktok,
            youtube,
        }
    }
}
