//! Builder for executing external tool commands with timeout support.

use crate::{Error, Result};
use bytes::Bytes;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output, raw.
    pub stdout: Bytes,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use jitmux_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> jitmux_av::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffmpeg"))
///     .args(["-f", "mpegts", "-i", "pipe:0", "-c", "copy", "-f", "mp4", "pipe:1"])
///     .stdin(vec![0x47; 188])
///     .execute()
///     .await?;
/// println!("{} bytes", output.stdout.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
    stdin_data: Option<Bytes>,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            stdin_data: None,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Provide data to be written to the process's stdin.
    pub fn stdin(&mut self, data: impl Into<Bytes>) -> &mut Self {
        self.stdin_data = Some(data.into());
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// Stdin is fed from a separate task while output is drained, so large
    /// inputs cannot deadlock against a full stdout pipe.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ToolFailed`] if spawning fails, the process times out
    /// or it exits with a non-zero status (message includes stderr).
    pub async fn execute(&self) -> Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(if self.stdin_data.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program = %program_name, args = ?self.args, "Running tool");

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::tool_failed(&program_name, format!("failed to spawn: {e}")))?;

        let writer = match (self.stdin_data.clone(), child.stdin.take()) {
            (Some(data), Some(mut stdin)) => Some(tokio::spawn(async move {
                let result = stdin.write_all(&data).await;
                // Dropping stdin closes the pipe so the child sees EOF.
                drop(stdin);
                result
            })),
            _ => None,
        };

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Err(e)) if e.kind() != std::io::ErrorKind::BrokenPipe => {
                    return Err(Error::tool_failed(
                        &program_name,
                        format!("failed to write stdin: {e}"),
                    ));
                }
                Err(e) => {
                    return Err(Error::tool_failed(
                        &program_name,
                        format!("stdin writer panicked: {e}"),
                    ));
                }
                _ => {}
            }
        }

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: Bytes::from(output.stdout),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(Error::tool_failed(
                        program_name,
                        format!(
                            "exited with status {}: {}",
                            output.status,
                            tool_output.stderr.trim()
                        ),
                    ));
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(Error::tool_failed(
                program_name,
                format!("I/O error waiting for process: {e}"),
            )),
            Err(_elapsed) => Err(Error::tool_failed(
                program_name,
                format!("timed out after {:?}", self.timeout),
            )),
        }
    }
}
