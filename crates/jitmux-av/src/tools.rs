//! External tool detection.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// Version string if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool answers `-version` and get its information.
///
/// ffmpeg and ffprobe only understand the single-dash form.
///
/// # Example
///
/// ```no_run
/// use jitmux_av::check_tool;
///
/// let info = check_tool("ffmpeg");
/// if info.available {
///     println!("ffmpeg version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(name: &str) -> ToolInfo {
    check_tool_with_arg(name, "-version")
}

/// Check if a tool is available using a custom version argument.
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    let result = Command::new(name).arg(version_arg).output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = which::which(name).ok();

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the tools a session needs: the engine and the transmuxer program.
pub fn check_tools(engine: &str, transmuxer: &str) -> Vec<ToolInfo> {
    let mut tools = vec![check_tool(engine)];
    if transmuxer != engine {
        tools.push(check_tool(transmuxer));
    }
    tools
}

/// Require that a tool is available, returning its path.
///
/// # Errors
///
/// Returns an error if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Resolve a configured program: an existing path is used as is, anything
/// else is looked up on `PATH`.
pub fn get_tool_path(program: &str) -> Result<PathBuf> {
    let path = Path::new(program);
    if path.components().count() > 1 && path.exists() {
        return Ok(path.to_path_buf());
    }

    require_tool(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tool_not_found() {
        let info = check_tool("nonexistent_tool_12345");
        assert!(!info.available);
        assert!(info.version.is_none());
        assert!(info.path.is_none());
    }

    #[test]
    fn test_get_tool_path_missing() {
        let err = get_tool_path("nonexistent_tool_12345").unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[test]
    fn test_check_tools_dedups_same_program() {
        let tools = check_tools("nonexistent_tool_12345", "nonexistent_tool_12345");
        assert_eq!(tools.len(), 1);
    }
}
