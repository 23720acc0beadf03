//! Rendition planning for new videos.

use std::path::Path;

use amur_av::ToolRegistry;
use amur_common::Resolution;

use crate::config::VideoConfig;

/// Standard resolutions for every candidate height the source can fill.
///
/// Output order follows `candidates`. Heights without a standard pair are
/// skipped.
pub fn target_resolutions(candidates: &[u32], source_height: u32) -> Vec<Resolution> {
    candidates
        .iter()
        .filter(|&&c| source_height >= c)
        .filter_map(|&c| Resolution::standard(c))
        .collect()
}

/// Height of the source video, falling back to the configured assumption.
pub async fn source_height(tools: &ToolRegistry, config: &VideoConfig, source: &Path) -> u32 {
    if !config.probe_source_height {
        return config.assumed_source_height;
    }

    match amur_av::probe_height(tools, source).await {
        Ok(height) => {
            tracing::debug!(path = %source.display(), height, "Probed source height");
            height
        }
        Err(e) => {
            tracing::warn!(
                path = %source.display(),
                error = %e,
                assumed = config.assumed_source_height,
                "Could not probe source height, using assumed height"
            );
            config.assumed_source_height
        }
    }
}
