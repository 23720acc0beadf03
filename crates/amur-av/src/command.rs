//! Subprocess execution for external codecs.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::tools::ToolConfig;
use crate::{Error, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// What a finished tool run printed.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl From<std::process::Output> for ToolOutput {
    fn from(output: std::process::Output) -> Self {
        Self {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

/// One invocation of an external codec.
///
/// stdin is closed, both output streams are captured, and the child is
/// killed if it outlives its timeout.
///
/// ```no_run
/// # async fn encode() -> amur_av::Result<()> {
/// amur_av::ToolCommand::new("cwebp".into())
///     .args(["cat.jpg", "-o", "cat.webp"])
///     .execute()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Start from a registered tool and inherit its timeout.
    pub fn for_tool(tool: &ToolConfig) -> Self {
        let mut cmd = Self::new(tool.path.clone());
        cmd.timeout = tool.timeout;
        cmd
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Paths are passed lossily; the public folder is expected to be UTF-8.
    pub fn path_arg(&mut self, path: &Path) -> &mut Self {
        self.arg(path.to_string_lossy())
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Short name used in errors and logs.
    fn tool_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .into_owned()
    }

    /// Run to completion.
    ///
    /// Spawn failure, timeout and a non-zero exit all surface as
    /// [`Error::ToolFailed`]; for a non-zero exit the message carries the
    /// tool's stderr.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let tool = self.tool_name();
        tracing::trace!(tool = %tool, args = ?self.args, "Running tool");

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::tool_failed(&tool, format!("failed to spawn: {e}")))?;

        let output: ToolOutput = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| Error::tool_failed(&tool, format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| Error::tool_failed(&tool, format!("wait failed: {e}")))?
            .into();

        if !output.status.success() {
            return Err(Error::tool_failed(
                tool,
                format!("{}: {}", output.status, output.stderr.trim()),
            ));
        }

        Ok(output)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sh(script: &str) -> ToolCommand {
        let mut cmd = ToolCommand::new(PathBuf::from("sh"));
        cmd.args(["-c", script]);
        cmd
    }

    #[tokio::test]
    async fn captures_stdout_and_stderr() {
        let out = sh("echo out; echo err >&2").execute().await.unwrap();
        assert!(out.status.success());
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let result = ToolCommand::new(PathBuf::from("/nonexistent/amur-codec"))
            .execute()
            .await;
        assert_matches!(result, Err(Error::ToolFailed { ref tool, .. }) if tool == "amur-codec");
    }

    #[tokio::test]
    async fn nonzero_exit_reports_stderr() {
        let err = sh("echo corrupt input >&2; exit 3").execute().await.unwrap_err();
        assert_matches!(err, Error::ToolFailed { ref tool, .. } if tool == "sh");
        assert!(err.to_string().contains("corrupt input"), "{err}");
    }

    #[tokio::test]
    async fn stdin_is_closed() {
        // `cat` would block forever on an inherited terminal.
        let out = ToolCommand::new(PathBuf::from("cat"))
            .timeout(Duration::from_secs(5))
            .execute()
            .await
            .unwrap();
        assert!(out.stdout.is_empty());
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let err = sh("sleep 10")
            .timeout(Duration::from_millis(100))
            .execute()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}
