use rand::Rng;
use unicode_normalization::UnicodeNormalization;

use crate::modules::media::model::{OutputFormat, Platform};

const MAX_NAME_LEN: usize = 80;

/// Turns an untrusted title into a filename stem: NFKD-folded, ASCII word
/// characters only, whitespace runs become `-`, capped at 80 characters.
/// Empty input gets a random platform-based name.
pub fn sanitize(title: &str, platform: Platform, format: OutputFormat) -> String {
    // Decomposition splits `é` into `e` plus a combining mark the filter drops.
    let kept: String = title
        .nfkd()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let stem: String = kept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(MAX_NAME_LEN)
        .collect();

    if stem.is_empty() {
        let suffix = rand::rng().random_range(1000..10000);
        format!("{}-{}-{}", platform.as_str(), format.kind(), suffix)
    } else {
        stem
    }
}

/// `<stem>.<ext>`
pub fn file_name(stem: &str, format: OutputFormat) -> String {
    format!("{}.{}", stem, format.extension())
}
