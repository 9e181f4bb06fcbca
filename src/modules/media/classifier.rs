use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static VIDEO_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("valid video id pattern"));

const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "youtube-nocookie.com"];
const YOUTUBE_PATH_PREFIXES: &[&str] = &["shorts", "embed", "live", "v"];

/// Result of looking at a user-supplied URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Tiktok,
    /// `video_id` is `None` when the host is YouTube but no valid
    /// identifier could be found.
    Youtube { video_id: Option<String> },
    Unsupported,
}

/// Never fails: anything that does not parse as an http(s) URL on a known
/// host is `Unsupported`.
pub fn classify(raw: &str) -> Classification {
    let Ok(url) = Url::parse(raw.trim()) else {
        return Classification::Unsupported;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return Classification::Unsupported;
    }
    let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
        return Classification::Unsupported;
    };

    if host_matches(&host, "tiktok.com") {
        return Classification::Tiktok;
    }

    if host == "youtu.be" || YOUTUBE_HOSTS.iter().any(|h| host_matches(&host, h)) {
        return Classification::Youtube {
            video_id: extract_youtube_id(&url, &host),
        };
    }

    Classification::Unsupported
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

fn extract_youtube_id(url: &Url, host: &str) -> Option<String> {
    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

    let candidate = if host == "youtu.be" {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("watch") | None => url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned()),
            Some(prefix) if YOUTUBE_PATH_PREFIXES.contains(&prefix) => {
                segments.next().map(str::to_string)
            }
            Some(_) => None,
        }
    }?;

    VIDEO_ID.is_match(&candidate).then_some(candidate)
}

pub fn canonical_watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}
