//! Video rescaling with ffmpeg.

use std::path::Path;

use amur_common::paths::scaled_sibling;
use amur_common::Resolution;

use super::{extension_lower, settle, Conversion};
use crate::command::ToolCommand;
use crate::output::AtomicOutput;
use crate::tools::ToolRegistry;
use crate::{Error, Result};

/// ffmpeg muxer for a container extension.
///
/// The staged output ends in `.part`, so ffmpeg cannot infer it.
fn muxer_for(ext: &str) -> &str {
    match ext {
        "mkv" => "matroska",
        "m4v" => "mp4",
        "ts" | "m2ts" => "mpegts",
        "mpg" | "mpeg" => "mpeg",
        "wmv" => "asf",
        other => other,
    }
}

/// Rescale `source` to `target`, publishing `{stem}_{height}p{ext}`.
pub async fn scale_video(
    tools: &ToolRegistry,
    source: &Path,
    target: Resolution,
) -> Result<Conversion> {
    let ext = extension_lower(source)
        .ok_or_else(|| Error::Unsupported(format!("no container extension: {}", source.display())))?;

    if !source.is_file() {
        return Err(Error::file_not_found(source));
    }

    let ffmpeg = tools.require("ffmpeg")?;
    let dest = scaled_sibling(source, target.height);
    let staged = AtomicOutput::new(&dest)?;

    tracing::info!(
        source = %source.display(),
        dest = %dest.display(),
        resolution = %target,
        "Scaling video"
    );

    let result = async {
        ToolCommand::for_tool(ffmpeg)
            .args(["-y", "-nostdin", "-v", "error", "-i"])
            .path_arg(source)
            .args(["-vf", &format!("scale={}:{}", target.width, target.height)])
            .args(["-c:a", "copy"])
            .args(["-f", muxer_for(&ext)])
            .path_arg(staged.path())
            .execute()
            .await?;
        staged.commit()
    }
    .await;

    settle(&dest, result)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::actions::testing::{fake_tool, FFMPEG_COPY};
    use assert_matches::assert_matches;
    use std::fs;

    #[test]
    fn muxer_names() {
        assert_eq!(muxer_for("mp4"), "mp4");
        assert_eq!(muxer_for("mkv"), "matroska");
        assert_eq!(muxer_for("webm"), "webm");
    }

    #[tokio::test]
    async fn writes_scaled_sibling() {
        let bin = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let src = media.path().join("clip.mp4");
        fs::write(&src, b"video").unwrap();

        let tools =
            ToolRegistry::default().with_tool("ffmpeg", fake_tool(bin.path(), "ffmpeg", FFMPEG_COPY));
        let out = scale_video(&tools, &src, Resolution::new(1280, 720))
            .await
            .unwrap();

        let dest = media.path().join("clip_720p.mp4");
        assert_eq!(out, Conversion::Produced(dest.clone()));
        assert_eq!(fs::read(dest).unwrap(), b"video");
        assert_eq!(fs::read_dir(media.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn failure_is_attempted() {
        let bin = tempfile::tempdir().unwrap();
        let media = tempfile::tempdir().unwrap();
        let src = media.path().join("clip.mkv");
        fs::write(&src, b"video").unwrap();

        let tools =
            ToolRegistry::default().with_tool("ffmpeg", fake_tool(bin.path(), "ffmpeg", "exit 1"));
        let out = scale_video(&tools, &src, Resolution::new(854, 480))
            .await
            .unwrap();

        assert_matches!(out, Conversion::Attempted { .. });
        assert!(!media.path().join("clip_480p.mkv").exists());
        assert_eq!(fs::read_dir(media.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn missing_tool_is_error() {
        let media = tempfile::tempdir().unwrap();
        let src = media.path().join("clip.mp4");
        fs::write(&src, b"video").unwrap();

        let res = scale_video(&ToolRegistry::default(), &src, Resolution::new(640, 360)).await;
        assert_matches!(res, Err(Error::ToolNotFound { .. }));
    }
}
