//! Codec actions: compressed-image encode, video rescale and HLS packaging.
//!
//! Every action publishes its artifact atomically and reports a
//! [`Conversion`] outcome. Failures of the external tool itself are not
//! errors: they are logged and reported as [`Conversion::Attempted`], leaving
//! the final path untouched so that a later reconciliation pass can retry.

mod hls;
mod scale;
mod webp;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::Result;

pub use hls::{package_hls, HLS_PLAYLIST};
pub use scale::scale_video;
pub use webp::{encode_webp, ENCODABLE_EXTENSIONS};

/// Result of invoking a conversion action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Conversion {
    /// The artifact was written to this path.
    Produced(PathBuf),
    /// Nothing to do for this source.
    NoOp,
    /// The tool ran and failed; `dest` was not touched.
    Attempted { dest: PathBuf, reason: String },
}

impl Conversion {
    pub fn is_produced(&self) -> bool {
        matches!(self, Self::Produced(_))
    }
}

/// Turn a tool or publish failure into [`Conversion::Attempted`].
///
/// Other errors (missing tool, missing source) propagate.
pub(crate) fn settle(dest: &Path, result: Result<PathBuf>) -> Result<Conversion> {
    match result {
        Ok(path) => Ok(Conversion::Produced(path)),
        Err(e) if e.is_retryable() => {
            tracing::warn!(dest = %dest.display(), error = %e, "Conversion attempt failed");
            Ok(Conversion::Attempted {
                dest: dest.to_path_buf(),
                reason: e.to_string(),
            })
        }
        Err(e) => Err(e),
    }
}

/// Lowercased extension of `path`, if any.
pub(crate) fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake codec binaries for exercising actions without real tools.

    use std::path::{Path, PathBuf};

    /// Write an executable shell script named `name` into `dir`.
    #[cfg(unix)]
    pub fn fake_tool(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    /// Copies the `-i` input to the last argument, like a transcode would.
    pub const FFMPEG_COPY: &str = r#"in=""; prev=""; last=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then in="$a"; fi
  prev="$a"; last="$a"
done
cp "$in" "$last""#;
}
