//! Shared test harness for integration tests.
//!
//! Provides [`PublicTree`], a scratch public folder with the standard layout,
//! plus image generators and fake codec binaries written as shell scripts.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use amur::config::Config;
use amur_av::ToolRegistry;
use image::{ImageBuffer, ImageFormat, Rgb, Rgba};
use tempfile::TempDir;

/// Copies the input to the output, like `cwebp in -o out` would.
pub const CWEBP_COPY: &str = r#"cp "$1" "$3""#;

/// Always fails with a message on stderr.
pub const FAILING_TOOL: &str = "echo 'codec exploded' >&2; exit 1";

/// A temporary public folder with `images/`, `videos/` and `files/`.
pub struct PublicTree {
    pub dir: TempDir,
    pub root: PathBuf,
}

impl PublicTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let root = dir.path().join("public");
        amur::ensure_public_folders(&root).expect("failed to create public folders");
        Self { dir, root }
    }

    pub fn images(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn videos(&self) -> PathBuf {
        self.root.join("videos")
    }

    /// Directory for fake tools, outside the public folder.
    pub fn bin(&self) -> PathBuf {
        let bin = self.dir.path().join("bin");
        std::fs::create_dir_all(&bin).expect("failed to create bin dir");
        bin
    }

    /// A registry whose `cwebp` runs `body`.
    #[cfg(unix)]
    pub fn cwebp(&self, body: &str) -> ToolRegistry {
        ToolRegistry::default().with_tool("cwebp", fake_tool(&self.bin(), "cwebp", body))
    }

    /// A config pointed at this tree with a small pool.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.storage.public_folder = self.root.clone();
        config.pipeline.workers = 2;
        config.sweep.enabled = false;
        config
    }
}

/// Write an executable shell script.
#[cfg(unix)]
pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn write_png(path: &Path, width: u32, height: u32) {
    let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 128, 255]));
    img.save_with_format(path, ImageFormat::Png).unwrap();
}

pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 64]));
    img.save_with_format(path, ImageFormat::Jpeg).unwrap();
}

/// Poll `check` until it holds or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    check()
}

pub fn non_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}
