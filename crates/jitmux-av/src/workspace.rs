//! Scratch filesystem for one engine instance.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Engine-side filesystem: an `input/` directory holding mounted files and an
/// `output/` directory for command results.
///
/// Everything is removed when the workspace is dropped, so terminating an
/// engine also discards its mounts and any output left behind.
///
/// # Example
///
/// ```no_run
/// use jitmux_av::EngineWorkspace;
///
/// let workspace = EngineWorkspace::new()?;
/// let mounted = workspace.mount("/path/to/input.mkv")?;
/// let output = workspace.output_file("chunk-0.ts");
/// # Ok::<(), jitmux_av::Error>(())
/// ```
#[derive(Debug)]
pub struct EngineWorkspace {
    temp_dir: TempDir,
}

impl EngineWorkspace {
    pub fn new() -> Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("jitmux-engine-")
            .tempdir()
            .map_err(|e| Error::Workspace(e.to_string()))?;

        for dir in ["input", "output"] {
            std::fs::create_dir(temp_dir.path().join(dir))
                .map_err(|e| Error::Workspace(format!("Failed to create {dir} dir: {e}")))?;
        }

        Ok(Self { temp_dir })
    }

    /// Root of the workspace.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn input_dir(&self) -> PathBuf {
        self.temp_dir.path().join("input")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.temp_dir.path().join("output")
    }

    /// Make `file` visible under `input/` and return the mounted path.
    ///
    /// Uses a symlink on unix and falls back to copying elsewhere. Mounting a
    /// file with the same name again replaces the previous mount.
    pub fn mount<P: AsRef<Path>>(&self, file: P) -> Result<PathBuf> {
        let file = file.as_ref();
        if !file.is_file() {
            return Err(Error::Workspace(format!(
                "Input file does not exist: {}",
                file.display()
            )));
        }

        let file_name = file
            .file_name()
            .ok_or_else(|| Error::Workspace("Invalid input file path".to_string()))?;
        let mounted = self.input_dir().join(file_name);

        if mounted.symlink_metadata().is_ok() {
            std::fs::remove_file(&mounted)?;
        }

        let source = std::fs::canonicalize(file)?;
        #[cfg(unix)]
        std::os::unix::fs::symlink(&source, &mounted)
            .map_err(|e| Error::Workspace(format!("Failed to mount input: {e}")))?;
        #[cfg(not(unix))]
        std::fs::copy(&source, &mounted)
            .map_err(|e| Error::Workspace(format!("Failed to mount input: {e}")))?;

        Ok(mounted)
    }

    /// Path of a file under `output/`.
    pub fn output_file(&self, name: &str) -> PathBuf {
        self.output_dir().join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_workspace_layout() {
        let workspace = EngineWorkspace::new().unwrap();
        assert!(workspace.input_dir().is_dir());
        assert!(workspace.output_dir().is_dir());
        assert!(workspace.output_file("chunk.ts").starts_with(workspace.root()));
    }

    #[test]
    fn test_mount_exposes_file_contents() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"payload").unwrap();

        let workspace = EngineWorkspace::new().unwrap();
        let mounted = workspace.mount(file.path()).unwrap();
        assert!(mounted.starts_with(workspace.input_dir()));
        assert_eq!(std::fs::read(&mounted).unwrap(), b"payload");

        // Remounting the same file is fine.
        workspace.mount(file.path()).unwrap();
    }

    #[test]
    fn test_mount_missing_file() {
        let workspace = EngineWorkspace::new().unwrap();
        assert!(matches!(
            workspace.mount("/nonexistent/input.mkv"),
            Err(Error::Workspace(_))
        ));
    }

    #[test]
    fn test_drop_removes_workspace() {
        let workspace = EngineWorkspace::new().unwrap();
        let root = workspace.root().to_path_buf();
        drop(workspace);
        assert!(!root.exists());
    }
}
