use regex::Regex;

use crate::metadata::VideoId;
use crate::PipelineError;
use crate::Result;

/// Extracts the canonical video id out of a raw share link.
///
/// Share links come in many shapes (mobile, desktop, copied with tracking
/// query junk); the id pattern is the only stable part, so resolution scans
/// the whole string rather than parsing URL structure.
pub struct LinkResolver {
    pattern: Regex,
}

impl LinkResolver {
    pub fn new(id_pattern: &str) -> Result<Self> {
        let pattern = Regex::new(id_pattern)
            .map_err(|e| anyhow::anyhow!("Invalid video id pattern '{}': {}", id_pattern, e))?;
        Ok(Self { pattern })
    }

    /// Resolve a raw URL string into a video id
    pub fn resolve(&self, url: &str) -> std::result::Result<VideoId, PipelineError> {
        self.pattern
            .find(url)
            .map(|m| VideoId::new(m.as_str()))
            .ok_or_else(|| PipelineError::UnresolvableLink(url.to_string()))
    }
}
