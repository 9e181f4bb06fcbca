use anyhow::Context;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

use clipdrop::config::settings::AppConfig;
use clipdrop::infrastructure::http::client::build_client;
use clipdrop::infrastructure::process::tools::Tool;
use clipdrop::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting server...");

    let config = AppConfig::new();
    let port = config.server_port;
    let http = build_client().context("failed to build HTTP client")?;
    let state = AppState::new(config, http);

    // Probe once at startup so missing tools show up in the log right away.
    state.tools.is_available(Tool::Ffmpeg);
    state.tools.is_available(Tool::YtDlp);

    let app = clipdrop::app::create_app(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server running on http://{}", addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
