//! Errors raised while producing an artifact with an external codec.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The codec is neither configured nor on `PATH`.
    #[error("{tool} is not installed")]
    ToolNotFound { tool: String },

    /// The codec could not be spawned, timed out, or exited non-zero.
    #[error("{tool} failed: {message}")]
    ToolFailed { tool: String, message: String },

    /// The codec ran but printed something we could not read.
    #[error("unreadable {tool} output: {message}")]
    ParseError { tool: String, message: String },

    #[error("source missing: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The source is not a type this adapter converts.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Staging or publishing the artifact failed.
    #[error("output error: {0}")]
    Output(String),
}

impl Error {
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    pub fn tool_failed(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolFailed {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            tool: tool.into(),
            message: message.into(),
        }
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Whether the tool ran and failed, or its output could not be
    /// published. A later attempt on the same source may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ToolFailed { .. } | Self::Output(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::tool_failed("cwebp", "exit status: 1").is_retryable());
        assert!(Error::Output("empty output".into()).is_retryable());

        assert!(!Error::tool_not_found("ffmpeg").is_retryable());
        assert!(!Error::file_not_found("/gone.jpg").is_retryable());
        assert!(!Error::parse_error("ffprobe", "N/A").is_retryable());
    }
}
