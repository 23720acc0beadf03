//! Source-video probing via ffprobe.

use std::path::Path;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;
use crate::{Error, Result};

/// Pixel height of the first video stream of `source`.
pub async fn probe_height(tools: &ToolRegistry, source: &Path) -> Result<u32> {
    if !source.is_file() {
        return Err(Error::file_not_found(source));
    }

    let ffprobe = tools.require("ffprobe")?;

    let output = ToolCommand::for_tool(ffprobe)
        .args(["-v", "error", "-select_streams", "v:0"])
        .args(["-show_entries", "stream=height"])
        .args(["-of", "csv=p=0"])
        .path_arg(source)
        .execute()
        .await?;

    parse_height(&output.stdout)
}

fn parse_height(stdout: &str) -> Result<u32> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| Error::parse_error("ffprobe", "no video stream"))?;

    // Some builds append a trailing separator.
    let value = line.trim_end_matches(',');
    match value.parse::<u32>() {
        Ok(h) if h > 0 => Ok(h),
        _ => Err(Error::parse_error(
            "ffprobe",
            format!("unexpected height {value:?}"),
        )),
    }
}
