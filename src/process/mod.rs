//! External process invocation.
//!
//! Every external tool (downloader, segmenter, search) goes through [`CommandRunner`]
//! so tests can substitute deterministic fakes. The production runner enforces a
//! timeout, caps captured output, and kills the child when cancelled or dropped.

use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::TranscriptorError;

/// A single invocation of an external program
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout,
            max_output_bytes: 1024 * 1024,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn max_output(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Value following `flag` in the argument list
    pub fn arg_after(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Last non-empty stderr line, for compact error messages
    pub fn stderr_tail(&self) -> &str {
        self.stderr
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Runs external programs
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, TranscriptorError>;
}

/// [`CommandRunner`] backed by `tokio::process`
#[derive(Debug, Default, Clone)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput, TranscriptorError> {
        tracing::debug!("Running {} {}", spec.program, spec.args.join(" "));

        let mut child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    TranscriptorError::NotConfigured(format!("{} is not installed", spec.program))
                }
                _ => TranscriptorError::ToolFailed(format!("failed to start {}: {}", spec.program, e)),
            })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = spec.max_output_bytes;

        let collect = async {
            tokio::try_join!(
                read_capped(stdout, cap),
                read_capped(stderr, cap),
                child.wait(),
            )
        };

        // Dropping `child` on any early return kills the process.
        let (out, err, status): (Vec<u8>, Vec<u8>, ExitStatus) = tokio::select! {
            res = tokio::time::timeout(spec.timeout, collect) => match res {
                Ok(Ok(collected)) => collected,
                Ok(Err(e)) => {
                    return Err(TranscriptorError::ToolFailed(format!("{} I/O error: {}", spec.program, e)));
                }
                Err(_) => {
                    return Err(TranscriptorError::Transient(format!(
                        "{} timed out after {}s",
                        spec.program,
                        spec.timeout.as_secs()
                    )));
                }
            },
            _ = cancel.cancelled() => return Err(TranscriptorError::Cancelled),
        };

        Ok(CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout: String::from_utf8_lossy(&out).into_owned(),
            stderr: String::from_utf8_lossy(&err).into_owned(),
        })
    }
}

/// Reads a pipe to EOF, keeping at most `cap` bytes. The pipe keeps being drained
/// past the cap so the child never blocks on a full buffer.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut kept = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(kept.len());
        kept.extend_from_slice(&buf[..n.min(room)]);
    }
    Ok(kept)
}

/// Run a tool with a version flag; returns its first output line when it runs.
pub async fn tool_version(
    runner: &dyn CommandRunner,
    program: &str,
    version_flag: &str,
) -> Option<String> {
    let spec = CommandSpec::new(program, Duration::from_secs(10)).arg(version_flag);
    match runner.run(&spec, &CancellationToken::new()).await {
        Ok(output) if output.success => Some(
            output
                .stdout
                .lines()
                .next()
                .unwrap_or("")
                .trim()
                .to_string(),
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arg_after_finds_flag_value() {
        let spec = CommandSpec::new("yt-dlp", Duration::from_secs(1))
            .args(["-o", "/tmp/a.%(ext)s", "--no-playlist"]);
        assert_eq!(spec.arg_after("-o"), Some("/tmp/a.%(ext)s"));
        assert_eq!(spec.arg_after("--no-playlist"), None);
        assert_eq!(spec.arg_after("-f"), None);
    }

    #[test]
    fn test_stderr_tail_skips_blank_lines() {
        let output = CommandOutput {
            stderr: "WARNING: x\nERROR: Video unavailable\n\n".to_string(),
            ..Default::default()
        };
        assert_eq!(output.stderr_tail(), "ERROR: Video unavailable");
    }

    #[tokio::test]
    async fn test_read_capped_drains_past_cap() {
        let data: &[u8] = &[7u8; 20_000];
        let kept = read_capped(Some(data), 100).await.unwrap();
        assert_eq!(kept.len(), 100);
    }

    #[tokio::test]
    async fn test_missing_program_is_configuration_failure() {
        let runner = TokioCommandRunner::new();
        let spec = CommandSpec::new("clipscribe-definitely-missing-tool", Duration::from_secs(5));
        let err = runner.run(&spec, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, TranscriptorError::NotConfigured(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runs_and_captures_stdout() {
        let runner = TokioCommandRunner::new();
        let spec = CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "echo hello"]);
        let output = runner.run(&spec, &CancellationToken::new()).await.unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_is_transient() {
        let runner = TokioCommandRunner::new();
        let spec = CommandSpec::new("sleep", Duration::from_millis(100)).arg("5");
        let err = runner.run(&spec, &CancellationToken::new()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancellation_aborts_process() {
        let runner = TokioCommandRunner::new();
        let spec = CommandSpec::new("sleep", Duration::from_secs(30)).arg("5");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = runner.run(&spec, &cancel).await.unwrap_err();
        assert_eq!(err, TranscriptorError::Cancelled);
    }
}
