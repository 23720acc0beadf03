//! Discovery of the codec binaries (cwebp, ffmpeg, ffprobe) the pipeline
//! shells out to.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Codecs the registry looks for.
pub const KNOWN_TOOLS: &[&str] = &["cwebp", "ffmpeg", "ffprobe"];

/// Optional path overrides for external tools, as found in the config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub cwebp_path: Option<PathBuf>,

    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
}

impl ToolsConfig {
    fn override_for(&self, name: &str) -> Option<&Path> {
        match name {
            "cwebp" => self.cwebp_path.as_deref(),
            "ffmpeg" => self.ffmpeg_path.as_deref(),
            "ffprobe" => self.ffprobe_path.as_deref(),
            _ => None,
        }
    }
}

/// Maximum runtime of a single invocation of `name`.
pub fn default_timeout(name: &str) -> Duration {
    match name {
        "cwebp" => Duration::from_secs(120),
        "ffprobe" => Duration::from_secs(30),
        // Full transcodes of long videos.
        "ffmpeg" => Duration::from_secs(4 * 60 * 60),
        _ => Duration::from_secs(300),
    }
}

/// A resolved external tool.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// Tool name (e.g. "ffmpeg").
    pub name: String,
    /// Resolved path to the executable.
    pub path: PathBuf,
    /// Maximum execution time before the tool is killed.
    pub timeout: Duration,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// Version string (first line of version output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Codecs found at startup, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolConfig>,
}

impl ToolRegistry {
    /// Discover tools, preferring configured paths over a `PATH` lookup.
    ///
    /// A configured path that does not exist falls back to [`which::which`].
    /// Tools that are not found are omitted; adapters needing them fail with
    /// [`Error::ToolNotFound`] at call time.
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut registry = Self::default();

        for &name in KNOWN_TOOLS {
            let resolved = match config.override_for(name) {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(
                        tool = name,
                        path = %p.display(),
                        "Configured tool path does not exist, searching PATH"
                    );
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            match resolved {
                Some(path) => {
                    tracing::debug!(tool = name, path = %path.display(), "Discovered tool");
                    registry = registry.with_tool(name, path);
                }
                None => tracing::debug!(tool = name, "Tool not found"),
            }
        }

        registry
    }

    /// Register (or replace) a tool at an explicit path.
    pub fn with_tool(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.tools.insert(
            name.to_string(),
            ToolConfig {
                name: name.to_string(),
                path: path.into(),
                timeout: default_timeout(name),
            },
        );
        self
    }

    /// Return the [`ToolConfig`] for the given tool.
    pub fn require(&self, name: &str) -> Result<&ToolConfig> {
        self.tools
            .get(name)
            .ok_or_else(|| Error::tool_not_found(name))
    }

    /// Whether the tool was discovered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Report every known codec, found or not, with its version.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(cfg) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(name, &cfg.path),
                    path: Some(cfg.path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run the tool's version flag and return the first non-empty output line.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let version_arg = match name {
        "ffmpeg" | "ffprobe" | "cwebp" => "-version",
        _ => "--version",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    // cwebp prints its version on stderr on some builds.
    let text = if output.stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).to_string()
    } else {
        String::from_utf8_lossy(&output.stdout).to_string()
    };

    text.lines()
        .find(|l| !l.trim().is_empty())
        .map(|s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn discover_with_default_config() {
        let registry = ToolRegistry::discover(&ToolsConfig::default());
        // Nothing guarantees the tools are installed; discovery must not panic.
        let _ = registry.check_all();
    }

    #[test]
    fn require_missing_tool_returns_error() {
        let registry = ToolRegistry::default();
        assert_matches!(
            registry.require("cwebp"),
            Err(Error::ToolNotFound { tool }) if tool == "cwebp"
        );
    }

    #[test]
    fn with_tool_overrides_discovery() {
        let registry = ToolRegistry::default().with_tool("ffprobe", "/opt/bin/ffprobe");
        let cfg = registry.require("ffprobe").unwrap();
        assert_eq!(cfg.path, PathBuf::from("/opt/bin/ffprobe"));
        assert_eq!(cfg.timeout, Duration::from_secs(30));
        assert!(registry.has("ffprobe"));
        assert!(!registry.has("ffmpeg"));
    }

    #[test]
    fn check_all_reports_every_known_tool() {
        let infos = ToolRegistry::default().check_all();
        let names: Vec<&str> = infos.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["cwebp", "ffmpeg", "ffprobe"]);
        assert!(infos.iter().all(|i| !i.available));
    }

    #[test]
    fn missing_override_falls_back_without_panicking() {
        let cfg = ToolsConfig {
            cwebp_path: Some(PathBuf::from("/definitely/not/here/cwebp")),
            ..Default::default()
        };
        let registry = ToolRegistry::discover(&cfg);
        if let Ok(tool) = registry.require("cwebp") {
            assert_ne!(tool.path, PathBuf::from("/definitely/not/here/cwebp"));
        }
    }

    #[test]
    fn tools_config_from_json() {
        let cfg: ToolsConfig =
            serde_json::from_str(r#"{"ffmpeg_path": "/usr/local/bin/ffmpeg"}"#).unwrap();
        assert_eq!(cfg.ffmpeg_path, Some(PathBuf::from("/usr/local/bin/ffmpeg")));
        assert!(cfg.cwebp_path.is_none());
    }
}
