use std::time::Duration;

use tracing::info;

const USER_AGENT: &str = concat!("clipdrop/", env!("CARGO_PKG_VERSION"));

/// Shared outbound client. Per-call timeouts are set on each request.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    info!("✅ HTTP client ready");
    Ok(client)
}
