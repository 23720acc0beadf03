//! Executes a single conversion job against the adapters.

use std::path::PathBuf;

use amur_av::{Conversion, ToolRegistry};
use amur_common::{ConversionJob, JobKind};

use crate::error::{Error, Result};
use crate::images;

/// Maps each job kind to its adapter.
///
/// Shared by the local worker pool and the distributed queue worker so both
/// paths produce identical artifacts.
#[derive(Debug, Clone)]
pub struct ConversionRunner {
    tools: ToolRegistry,
    hls_segment_secs: u32,
}

impl ConversionRunner {
    pub fn new(tools: ToolRegistry, hls_segment_secs: u32) -> Self {
        Self {
            tools,
            hls_segment_secs,
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run the adapter for `job`.
    pub async fn run(&self, job: &ConversionJob) -> Result<Conversion> {
        let source = job.path();
        let outcome = match job.kind {
            JobKind::ImageOptimize => amur_av::encode_webp(&self.tools, source).await?,
            JobKind::ImageThumbnail => {
                let source: PathBuf = source.to_path_buf();
                tokio::task::spawn_blocking(move || images::make_thumbnail(&source)).await??
            }
            JobKind::VideoScale => {
                let target = job.scale.ok_or_else(|| {
                    Error::invalid_input(format!("{} has no target resolution", job))
                })?;
                amur_av::scale_video(&self.tools, source, target).await?
            }
            JobKind::VideoHls => {
                amur_av::package_hls(&self.tools, source, self.hls_segment_secs).await?
            }
        };
        Ok(outcome)
    }

    /// Run `job` and log the outcome; errors never escape.
    pub async fn run_logged(&self, job: &ConversionJob) -> Option<Conversion> {
        match self.run(job).await {
            Ok(Conversion::Produced(dest)) => {
                tracing::info!(job = %job, dest = %dest.display(), "Conversion produced");
                Some(Conversion::Produced(dest))
            }
            Ok(Conversion::NoOp) => {
                tracing::debug!(job = %job, "Conversion not needed");
                Some(Conversion::NoOp)
            }
            Ok(attempted @ Conversion::Attempted { .. }) => Some(attempted),
            Err(e) => {
                tracing::warn!(job = %job, error = %e, "Conversion failed");
                None
            }
        }
    }
}
