//! Path conventions for sibling artifacts.
//!
//! Every derived artifact lives next to its source:
//!
//! | artifact          | name                      |
//! |-------------------|---------------------------|
//! | compressed image  | `{stem}.webp`             |
//! | thumbnail         | `{stem}_thumb{ext}`       |
//! | scaled rendition  | `{stem}_{height}p{ext}`   |
//! | streaming package | `{stem}_hls/index.m3u8`   |
//!
//! Derived artifacts are themselves media files, so the pipeline must be able to
//! recognize them and refuse to derive from them again. The image markers are
//! recognized by name alone. Video renditions and packages are recognized only
//! when the video they were made from still sits next to them, so a user file
//! that merely looks like one is still converted.

use std::fs;
use std::path::{Path, PathBuf};

/// Marker inserted before the extension of thumbnail siblings.
pub const THUMBNAIL_MARKER: &str = "_thumb";

/// Extension of compressed image siblings.
pub const COMPRESSED_EXTENSION: &str = "webp";

/// Suffix of in-progress downloads and in-progress conversion outputs.
pub const TEMP_SUFFIX: &str = ".part";

/// Suffix of the directory holding a streaming package.
pub const HLS_DIR_SUFFIX: &str = "_hls";

/// Playlist file name inside a streaming package.
pub const HLS_PLAYLIST: &str = "index.m3u8";

/// Top-level folders created under the public root at startup.
pub const ESSENTIAL_FOLDERS: &[&str] = &["files", "images", "videos"];

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

fn sibling(path: &Path, name: String) -> PathBuf {
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// `{stem}.webp` next to `path`.
pub fn compressed_sibling(path: &Path) -> PathBuf {
    path.with_extension(COMPRESSED_EXTENSION)
}

/// `{stem}_thumb{ext}` next to `path`.
pub fn thumbnail_sibling(path: &Path) -> PathBuf {
    sibling(
        path,
        format!("{}{}{}", stem(path), THUMBNAIL_MARKER, dotted_extension(path)),
    )
}

/// `{stem}_{height}p{ext}` next to `path`.
pub fn scaled_sibling(path: &Path, height: u32) -> PathBuf {
    sibling(
        path,
        format!("{}_{}p{}", stem(path), height, dotted_extension(path)),
    )
}

/// `{stem}_hls/` next to `path`.
pub fn hls_dir(path: &Path) -> PathBuf {
    sibling(path, format!("{}{}", stem(path), HLS_DIR_SUFFIX))
}

/// Whether the file name carries the thumbnail marker.
pub fn is_thumbnail(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().contains(THUMBNAIL_MARKER))
        .unwrap_or(false)
}

/// Whether the path already bears the compressed-format extension.
pub fn is_compressed(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().eq_ignore_ascii_case(COMPRESSED_EXTENSION))
        .unwrap_or(false)
}

/// Sibling a `{base}_{digits}p{ext}` name would have been scaled from.
fn rendition_origin(path: &Path) -> Option<PathBuf> {
    let stem = stem(path);
    let (base, suffix) = stem.rsplit_once('_')?;
    let digits = suffix.strip_suffix('p')?;
    if base.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(sibling(path, format!("{base}{}", dotted_extension(path))))
}

/// Whether `path` is a scaled rendition of a video stored next to it.
pub fn is_scaled_rendition(path: &Path) -> bool {
    rendition_origin(path).is_some_and(|origin| origin.is_file())
}

/// The video a `{stem}_hls/` directory was packaged from.
///
/// `None` unless the directory holds a playlist and a sibling file with the
/// matching stem exists.
pub fn package_source(dir: &Path) -> Option<PathBuf> {
    let name = dir.file_name()?.to_string_lossy().into_owned();
    let base = name.strip_suffix(HLS_DIR_SUFFIX)?;
    if base.is_empty() || !dir.join(HLS_PLAYLIST).is_file() {
        return None;
    }

    fs::read_dir(dir.parent()?)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|p| p.is_file() && p.file_stem().is_some_and(|s| s.to_string_lossy() == base))
}

/// Whether `dir` is a streaming package produced by the pipeline.
pub fn is_hls_package(dir: &Path) -> bool {
    package_source(dir).is_some()
}

/// Whether any ancestor directory is a streaming package.
pub fn is_inside_hls_package(path: &Path) -> bool {
    path.ancestors().skip(1).any(is_hls_package)
}

/// Whether the path is an image artifact produced by the pipeline.
///
/// Derived files are never used as a conversion source.
pub fn is_derived(path: &Path) -> bool {
    is_thumbnail(path) || is_compressed(path)
}

/// [`is_derived`], plus scaled renditions and streaming package members.
pub fn is_derived_video(path: &Path) -> bool {
    is_derived(path) || is_scaled_rendition(path) || is_inside_hls_package(path)
}

/// Whether the path is, or lives under, an in-progress temporary.
pub fn is_temporary(path: &Path) -> bool {
    path.components()
        .any(|c| c.as_os_str().to_string_lossy().ends_with(TEMP_SUFFIX))
}

/// State of the image sibling artifacts on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageArtifacts {
    /// `{stem}.webp` exists and is non-empty.
    pub compressed_valid: bool,
    /// `{stem}_thumb{ext}` exists.
    pub thumbnail_exists: bool,
}

impl ImageArtifacts {
    pub fn is_complete(&self) -> bool {
        self.compressed_valid && self.thumbnail_exists
    }
}

/// Check the sibling artifacts of an image source against their validity rules.
pub fn image_artifacts(source: &Path) -> ImageArtifacts {
    let compressed_valid = fs::metadata(compressed_sibling(source))
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false);
    let thumbnail_exists = thumbnail_sibling(source).exists();

    ImageArtifacts {
        compressed_valid,
        thumbnail_exists,
    }
}
