//! HLS streaming-package generation with ffmpeg.

use std::path::Path;

use amur_common::paths::hls_dir;
pub use amur_common::paths::HLS_PLAYLIST;

use super::{settle, Conversion};
use crate::command::ToolCommand;
use crate::output::AtomicDir;
use crate::tools::ToolRegistry;
use crate::{Error, Result};

/// Package `source` as HLS into the `{stem}_hls/` sibling directory.
///
/// Produces:
/// - `index.m3u8`: VOD playlist
/// - `init.mp4`: fMP4 initialization segment
/// - `seg0000.m4s`, `seg0001.m4s`, ...: media segments
///
/// The package is built in a hidden temporary directory and swapped in only
/// when the playlist exists.
pub async fn package_hls(
    tools: &ToolRegistry,
    source: &Path,
    segment_secs: u32,
) -> Result<Conversion> {
    if !source.is_file() {
        return Err(Error::file_not_found(source));
    }

    let ffmpeg = tools.require("ffmpeg")?;
    let dest = hls_dir(source);
    let staged = AtomicDir::new(&dest)?;

    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        segment_secs,
        "Packaging HLS"
    );

    let result = async {
        let seg_pattern = staged.path().join("seg%04d.m4s");
        let playlist = staged.path().join(HLS_PLAYLIST);

        ToolCommand::for_tool(ffmpeg)
            .args(["-y", "-nostdin", "-v", "error", "-i"])
            .path_arg(source)
            .args(["-c:v", "libx264", "-c:a", "aac", "-f", "hls"])
            .args(["-hls_time", &segment_secs.max(1).to_string()])
            .args(["-hls_segment_type", "fmp4"])
            .args(["-hls_playlist_type", "vod"])
            .arg("-hls_segment_filename")
            .path_arg(&seg_pattern)
            .args(["-hls_fmp4_init_filename", "init.mp4"])
            .path_arg(&playlist)
            .execute()
            .await?;
        staged.commit(HLS_PLAYLIST)
    }
    .await;

    settle(&dest, result)
}
