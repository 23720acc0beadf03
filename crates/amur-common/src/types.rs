//! Core type definitions for media classification and conversion jobs.
//!
//! Enums are serialized in lowercase (or as `group:action` strings for job
//! kinds) so that they read naturally in queue payloads and log lines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// What a file contains, as determined by content sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    /// A still image.
    Image,
    /// A video container.
    Video,
    /// Anything else. Dropped by the pipeline.
    Other,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// The kind of derived artifact a conversion job produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// Compressed (`.webp`) image sibling.
    #[serde(rename = "image:optimize")]
    ImageOptimize,
    /// Half-size thumbnail sibling.
    #[serde(rename = "image:thumbnail")]
    ImageThumbnail,
    /// Scaled video rendition.
    #[serde(rename = "video:scale")]
    VideoScale,
    /// HLS streaming package.
    #[serde(rename = "video:hls")]
    VideoHls,
}

impl JobKind {
    /// Wire name used for queue payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ImageOptimize => "image:optimize",
            Self::ImageThumbnail => "image:thumbnail",
            Self::VideoScale => "video:scale",
            Self::VideoHls => "video:hls",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image:optimize" => Ok(Self::ImageOptimize),
            "image:thumbnail" => Ok(Self::ImageThumbnail),
            "video:scale" => Ok(Self::VideoScale),
            "video:hls" => Ok(Self::VideoHls),
            _ => Err(format!("Unknown job kind: {}", s)),
        }
    }
}

/// A `width:height` pair used for video renditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The 16:9 resolution conventionally paired with `height`.
    pub fn standard(height: u32) -> Option<Self> {
        let width = match height {
            2160 => 3840,
            1440 => 2560,
            1080 => 1920,
            720 => 1280,
            540 => 960,
            480 => 854,
            360 => 640,
            240 => 426,
            _ => return None,
        };
        Some(Self::new(width, height))
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

/// Process-wide choice of where image conversions run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionBackend {
    /// Run on the local bounded worker pool.
    #[default]
    Inline,
    /// Push onto the distributed job queue.
    Queued,
}

impl fmt::Display for ExecutionBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline => write!(f, "inline"),
            Self::Queued => write!(f, "queued"),
        }
    }
}

/// A single unit of conversion work. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionJob {
    pub kind: JobKind,
    pub target_path: PathBuf,
    /// Target rendition, only set for [`JobKind::VideoScale`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Resolution>,
}

/// Idempotency key of a [`ConversionJob`].
pub type JobKey = (PathBuf, JobKind, Option<Resolution>);

impl ConversionJob {
    pub fn new(kind: JobKind, target_path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            target_path: target_path.into(),
            scale: None,
        }
    }

    pub fn optimize(path: impl Into<PathBuf>) -> Self {
        Self::new(JobKind::ImageOptimize, path)
    }

    pub fn thumbnail(path: impl Into<PathBuf>) -> Self {
        Self::new(JobKind::ImageThumbnail, path)
    }

    pub fn hls(path: impl Into<PathBuf>) -> Self {
        Self::new(JobKind::VideoHls, path)
    }

    pub fn scale(path: impl Into<PathBuf>, resolution: Resolution) -> Self {
        Self {
            kind: JobKind::VideoScale,
            target_path: path.into(),
            scale: Some(resolution),
        }
    }

    /// Repeating a job with the same key converges on the same end state.
    pub fn key(&self) -> JobKey {
        (self.target_path.clone(), self.kind, self.scale)
    }

    pub fn path(&self) -> &Path {
        &self.target_path
    }
}

impl fmt::Display for ConversionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scale {
            Some(res) => write!(f, "{} {} -> {}", self.kind, self.target_path.display(), res),
            None => write!(f, "{} {}", self.kind, self.target_path.display()),
        }
    }
}
