//! # amur-av
//!
//! External codec tooling for the amur conversion pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to cwebp,
//!   ffmpeg and ffprobe, honoring configured overrides.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **Atomic outputs** ([`AtomicOutput`], [`AtomicDir`]) -- stage into a
//!   hidden `.part` sibling and rename into place on success.
//! - **Probing** ([`probe_height`]) -- source video height via ffprobe.
//! - **Actions** ([`actions`]) -- webp encode, video rescale and HLS
//!   packaging, each reporting a [`Conversion`] outcome.

pub mod actions;
pub mod command;
pub mod error;
pub mod output;
pub mod probe;
pub mod tools;

// ---- Re-exports for convenience ----

pub use actions::{encode_webp, package_hls, scale_video, Conversion};
pub use command::{ToolCommand, ToolOutput};
pub use error::{Error, Result};
pub use output::{AtomicDir, AtomicOutput};
pub use probe::probe_height;
pub use tools::{ToolConfig, ToolInfo, ToolRegistry, ToolsConfig};
