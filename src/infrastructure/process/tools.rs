use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::{info, warn};

use crate::common::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    YtDlp,
}

impl Tool {
    pub fn name(&self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::YtDlp => "yt-dlp",
        }
    }
}

#[derive(Debug)]
struct ToolSlot {
    configured: PathBuf,
    resolved: OnceLock<Option<PathBuf>>,
}

impl ToolSlot {
    fn new(configured: PathBuf) -> Self {
        Self {
            configured,
            resolved: OnceLock::new(),
        }
    }
}

/// Locates external binaries once per process and answers capability
/// checks from the cached result.
#[derive(Debug)]
pub struct ToolRegistry {
    ffmpeg: ToolSlot,
    ytdlp: ToolSlot,
}

impl ToolRegistry {
    pub fn new(ffmpeg: impl Into<PathBuf>, ytdlp: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ToolSlot::new(ffmpeg.into()),
            ytdlp: ToolSlot::new(ytdlp.into()),
        }
    }

    fn slot(&self, tool: Tool) -> &ToolSlot {
        match tool {
            Tool::Ffmpeg => &self.ffmpeg,
            Tool::YtDlp => &self.ytdlp,
        }
    }

    /// Resolved executable path, probing `PATH` on first use.
    pub fn locate(&self, tool: Tool) -> Option<&Path> {
        let slot = self.slot(tool);
        slot.resolved
            .get_or_init(|| match which::which(&slot.configured) {
                Ok(path) => {
                    info!("Found {} at {}", tool.name(), path.display());
                    Some(path)
                }
                Err(e) => {
                    warn!(
                        "{} not found (configured as {}): {}",
                        tool.name(),
                        slot.configured.display(),
                        e
                    );
                    None
                }
            })
            .as_deref()
    }

    pub fn is_available(&self, tool: Tool) -> bool {
        self.locate(tool).is_some()
    }

    pub fn require(&self, tool: Tool) -> Result<&Path, AppError> {
        self.locate(tool).ok_or(AppError::ToolUnavailable(tool.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_fails_fast() {
        let registry = ToolRegistry::new("/nonexistent/ffmpeg-xyz", "/nonexistent/yt-dlp-xyz");
        assert!(!registry.is_available(Tool::Ffmpeg));
        assert!(matches!(
            registry.require(Tool::YtDlp),
            Err(AppError::ToolUnavailable("yt-dlp"))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn absolute_executable_is_found_and_cached() {
        let registry = ToolRegistry::new("/bin/sh", "/nonexistent/yt-dlp-xyz");
        let first = registry.locate(Tool::Ffmpeg).map(Path::to_path_buf);
        assert!(first.is_some());
        assert_eq!(registry.locate(Tool::Ffmpeg).map(Path::to_path_buf), first);
    }
}
