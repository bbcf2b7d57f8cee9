//! CLI end-to-end tests
//!
//! Tests for the jitmux command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use jitmux_common::TimeRanges;
use jitmux_media::mp4::HandlerType;
use jitmux_media::{split_segments, InitInfo};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the jitmux binary
#[allow(deprecated)]
fn jitmux_cmd() -> Command {
    let mut cmd = Command::cargo_bin("jitmux").unwrap();
    // Keep default config lookup away from the developer's machine.
    cmd.current_dir(std::env::temp_dir());
    cmd
}

/// Write a 30 second H.264/AAC Matroska file, or `None` when ffmpeg or
/// libx264 is unavailable.
fn generate_sample(dir: &Path) -> Option<PathBuf> {
    let ffmpeg = which::which("ffmpeg").ok()?;
    let path = dir.join("sample.mkv");
    let status = Command::new(ffmpeg)
        .args([
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=duration=30:size=160x120:rate=10",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:duration=30",
            "-c:v",
            "libx264",
            "-preset",
            "ultrafast",
            "-g",
            "10",
            "-c:a",
            "aac",
            "-shortest",
        ])
        .arg(&path)
        .status()
        .ok()?;
    status.success().then_some(path)
}

/// Buffered video ranges of an fMP4 file, read from its fragments.
fn video_ranges(data: &[u8]) -> TimeRanges {
    let split = split_segments(data).unwrap();
    let info = InitInfo::parse(&split.init_segment.expect("init segment")).unwrap();
    info.fragment_spans(&split.media)
        .unwrap()
        .into_iter()
        .filter(|s| s.handler == HandlerType::Video)
        .map(|s| (s.range.start, s.range.end))
        .collect()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = jitmux_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = jitmux_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("jitmux"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = jitmux_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("jitmux"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = jitmux_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "jitmux {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = jitmux_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg").or(predicate::str::contains("tools")));
}

#[test]
fn test_cli_play_help() {
    let mut cmd = jitmux_cmd();
    cmd.args(["play", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("simulated clock"));
}

#[test]
fn test_cli_probe_help() {
    let mut cmd = jitmux_cmd();
    cmd.args(["probe", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Probe a media file"));
}

#[test]
fn test_cli_play_nonexistent_file() {
    let mut cmd = jitmux_cmd();
    cmd.args(["play", "/nonexistent/path/movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_probe_nonexistent_file() {
    let mut cmd = jitmux_cmd();
    cmd.args(["probe", "/nonexistent/path/movie.mkv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_validate_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("jitmux.toml");

    fs::write(
        &config_file,
        r#"
[engine]
core = "ffmpeg"

[buffer]
size_secs = 8.0
refill_secs = 4.0

[playback]
tick_ms = 100
"#,
    )
    .unwrap();

    let mut cmd = jitmux_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("8s chunks, refill below 4s"));
}

#[test]
fn test_cli_validate_rejects_bad_buffer() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("jitmux.toml");
    fs::write(&config_file, "[buffer]\nsize_secs = 2.0\nrefill_secs = 3.0\n").unwrap();

    let mut cmd = jitmux_cmd();
    cmd.args(["--config", config_file.to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds buffer size"));
}

#[test]
fn test_cli_validate_defaults() {
    let mut cmd = jitmux_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"))
        .stdout(predicate::str::contains("10s chunks"));
}

#[test]
fn test_cli_play_appends_consecutive_chunks() {
    let temp = tempdir().unwrap();
    let Some(input) = generate_sample(temp.path()) else {
        eprintln!("Skipping: ffmpeg with libx264 not available");
        return;
    };
    let output = temp.path().join("out.mp4");

    let mut cmd = jitmux_cmd();
    let assert = cmd
        .args([
            "play",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
            "--until",
            "15",
            "--rate",
            "8",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Parsed metadata:"))
        .stdout(predicate::str::contains("Reached 15.00s"));

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).into_owned();
    assert!(stdout.matches("Added remuxed video").count() >= 2, "{stdout}");

    let data = fs::read(&output).unwrap();
    assert_eq!(&data[4..8], b"ftyp");

    // The second chunk continues the timeline instead of restarting at zero.
    let ranges = video_ranges(&data);
    let range = ranges.find(0.5).expect("start is buffered");
    assert!(range.start < 0.5, "buffered: {ranges}");
    assert!(range.end >= 15.0, "buffered: {ranges}");
}
