//! Metadata resolution, one variant per platform.

pub mod tiktok;
pub mod youtube;

pub use tiktok::TiktokResolver;
pub use youtube::{ExtractorOutput, YoutubeResolver};
