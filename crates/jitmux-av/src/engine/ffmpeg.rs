//! Engine backed by an ffmpeg process per command.

use super::{Completion, EngineAssets, EngineEvent, Execution, ExecutionSender, TranscodeEngine};
use crate::command::ToolCommand;
use crate::tools::get_tool_path;
use crate::workspace::EngineWorkspace;
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// Options every command gets: never read the terminal, no progress
/// spam in the log, overwrite outputs.
const GLOBAL_ARGS: &[&str] = &["-nostdin", "-nostats", "-y"];

/// Runs each command as a child process inside a private [`EngineWorkspace`].
///
/// The assets' `core` names the program (a path or something on `PATH`);
/// `wasm`, when set, is passed as its first argument. Every stderr line
/// becomes an [`EngineEvent::Log`]. A normal exit, whatever the exit code,
/// completes the command; a death by signal that the engine did not cause
/// itself is reported as a crash.
#[derive(Debug, Default)]
pub struct FfmpegEngine {
    program: Option<PathBuf>,
    prefix_args: Vec<String>,
    workspace: Option<EngineWorkspace>,
    abort: Option<oneshot::Sender<()>>,
}

impl FfmpegEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn workspace(&self) -> Result<&EngineWorkspace> {
        self.workspace
            .as_ref()
            .ok_or_else(|| Error::Workspace("engine not initialized".to_string()))
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn initialize(&mut self, assets: &EngineAssets) -> Result<()> {
        let program = get_tool_path(&assets.core).map_err(|e| Error::EngineLoad(e.to_string()))?;
        let prefix_args: Vec<String> = assets.wasm.iter().cloned().collect();

        let output = ToolCommand::new(program.clone())
            .args(prefix_args.iter().cloned())
            .arg("-version")
            .timeout(VERSION_TIMEOUT)
            .execute()
            .await
            .map_err(|e| Error::EngineLoad(e.to_string()))?;

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();

        let workspace =
            EngineWorkspace::new().map_err(|e| Error::EngineLoad(e.to_string()))?;

        tracing::debug!(
            program = %program.display(),
            version = %version,
            workspace = %workspace.root().display(),
            "Engine initialized"
        );

        self.program = Some(program);
        self.prefix_args = prefix_args;
        self.workspace = Some(workspace);
        Ok(())
    }

    async fn mount(&mut self, file: &Path) -> Result<String> {
        let mounted = self.workspace()?.mount(file)?;
        Ok(mounted.to_string_lossy().into_owned())
    }

    async fn execute(&mut self, args: Vec<String>) -> Result<Execution> {
        let program = self
            .program
            .clone()
            .ok_or_else(|| Error::EngineCrashed("engine not initialized".to_string()))?;

        let mut cmd = Command::new(&program);
        cmd.args(&self.prefix_args)
            .args(GLOBAL_ARGS)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Ok(workspace) = self.workspace() {
            cmd.current_dir(workspace.root());
        }

        tracing::debug!(program = %program.display(), ?args, "Executing engine command");

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::EngineCrashed(format!("failed to spawn engine: {e}")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::EngineCrashed("engine stderr not captured".to_string()))?;

        let (tx, execution) = Execution::channel();
        let (abort_tx, abort_rx) = oneshot::channel();
        self.abort = Some(abort_tx);

        tokio::spawn(drive(child, stderr, tx, abort_rx));

        Ok(execution)
    }

    fn output_path(&self, name: &str) -> String {
        match &self.workspace {
            Some(workspace) => workspace.output_file(name).to_string_lossy().into_owned(),
            None => name.to_string(),
        }
    }

    async fn read_output(&mut self, path: &str) -> Result<Bytes> {
        match tokio::fs::read(path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path, "Engine produced no output file");
                Ok(Bytes::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_output(&mut self, path: &str) -> Result<()> {
        match tokio::fs::remove_file(path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn terminate(&mut self) {
        if let Some(abort) = self.abort.take() {
            let _ = abort.send(());
        }
        self.workspace = None;
        self.program = None;
    }
}

/// Forward stderr lines until the process exits, then send the terminal event.
async fn drive(
    mut child: Child,
    stderr: ChildStderr,
    tx: ExecutionSender,
    mut abort: oneshot::Receiver<()>,
) {
    let mut lines = BufReader::new(stderr).lines();
    let mut aborted = false;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let _ = tx.send(EngineEvent::Log(line));
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(error = %e, "Failed to read engine output");
                    break;
                }
            },
            // Fires on an explicit abort and when the engine is dropped.
            _ = &mut abort, if !aborted => {
                aborted = true;
                let _ = child.start_kill();
            }
        }
    }

    let event = match child.wait().await {
        Ok(_) if aborted => EngineEvent::Completed(Completion::Aborted),
        Ok(status) if status.code().is_some() => EngineEvent::Completed(Completion::Finished),
        Ok(status) => EngineEvent::Crashed(format!("engine terminated abnormally ({status})")),
        Err(e) => EngineEvent::Crashed(format!("failed to wait for engine: {e}")),
    };
    let _ = tx.send(event);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Write an executable shell script that answers `-version` and runs
    /// `body` for any other invocation.
    fn fake_engine(dir: &TempDir, body: &str) -> EngineAssets {
        let path = dir.path().join("fake-ffmpeg");
        let script = format!(
            "#!/bin/sh\ncase \"$*\" in *-version*) echo 'fake ffmpeg 1.0'; exit 0;; esac\n{body}\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        EngineAssets::new(path.to_string_lossy())
    }

    #[tokio::test]
    async fn test_initialize_missing_program() {
        let mut engine = FfmpegEngine::new();
        let err = engine
            .initialize(&EngineAssets::new("nonexistent_engine_12345"))
            .await
            .unwrap_err();
        assert_matches!(err, Error::EngineLoad(_));
    }

    #[tokio::test]
    async fn test_execute_streams_stderr_lines() {
        let dir = TempDir::new().unwrap();
        let assets = fake_engine(
            &dir,
            "echo '  Duration: 00:00:05.00, start: 0.000000' >&2\n\
             echo '  Stream #0:0: Video: h264 (High)' >&2\n\
             exit 1",
        );

        let mut engine = FfmpegEngine::new();
        engine.initialize(&assets).await.unwrap();
        let execution = engine.execute(vec!["-i".into(), "x".into()]).await.unwrap();
        let (completion, lines) = execution.wait(|_| {}).await.unwrap();

        assert_eq!(completion, Completion::Finished);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Duration"));
    }

    #[tokio::test]
    async fn test_signal_death_is_crash() {
        let dir = TempDir::new().unwrap();
        let assets = fake_engine(&dir, "kill -9 $$");

        let mut engine = FfmpegEngine::new();
        engine.initialize(&assets).await.unwrap();
        let execution = engine.execute(vec![]).await.unwrap();
        assert_matches!(execution.wait(|_| {}).await, Err(Error::EngineCrashed(_)));
    }

    #[tokio::test]
    async fn test_terminate_aborts_running_command() {
        let dir = TempDir::new().unwrap();
        let assets = fake_engine(&dir, "exec sleep 30");

        let mut engine = FfmpegEngine::new();
        engine.initialize(&assets).await.unwrap();
        let execution = engine.execute(vec![]).await.unwrap();
        engine.terminate();
        engine.terminate();

        let (completion, _) = execution.wait(|_| {}).await.unwrap();
        assert_eq!(completion, Completion::Aborted);
    }

    #[tokio::test]
    async fn test_output_roundtrip() {
        let dir = TempDir::new().unwrap();
        let assets = fake_engine(&dir, "exit 0");

        let mut engine = FfmpegEngine::new();
        engine.initialize(&assets).await.unwrap();

        let path = engine.output_path("chunk.ts");
        assert!(engine.read_output(&path).await.unwrap().is_empty());

        std::fs::write(&path, b"ts-data").unwrap();
        assert_eq!(&engine.read_output(&path).await.unwrap()[..], b"ts-data");
        engine.delete_output(&path).await.unwrap();
        engine.delete_output(&path).await.unwrap();
        assert!(!Path::new(&path).exists());
    }
}
