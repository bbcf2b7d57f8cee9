mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    parse_config(&content).with_context(|| format!("Invalid config file: {:?}", path))
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;
    validate_config(&config)?;
    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./jitmux.toml",
        "./config.toml",
        "~/.config/jitmux/config.toml",
        "/etc/jitmux/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.engine.core.trim().is_empty() {
        anyhow::bail!("Engine core program cannot be empty");
    }
    if config.engine.transmuxer.trim().is_empty() {
        anyhow::bail!("Transmuxer program cannot be empty");
    }

    config.buffer.scheduler_config().validate()?;

    if config.playback.tick_ms == 0 {
        anyhow::bail!("Playback tick interval cannot be 0");
    }
    if !(config.playback.rate > 0.0) {
        anyhow::bail!(
            "Playback rate must be positive, got {}",
            config.playback.rate
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.engine.core, "ffmpeg");
        assert_eq!(config.engine.transmuxer, "ffmpeg");
        assert!(config.engine.wasm.is_none());
        assert_eq!(config.buffer.size_secs, 10.0);
        assert_eq!(config.buffer.refill_secs, 5.0);
        assert_eq!(config.playback.tick_ms, 250);
        assert_eq!(config.playback.rate, 1.0);
    }

    #[test]
    fn test_partial_sections() {
        let config = parse_config(
            r#"
            [engine]
            core = "/opt/ffmpeg/bin/ffmpeg"
            wasm = "core.wasm"

            [buffer]
            size_secs = 6.0
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.core, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(config.engine.transmuxer, "ffmpeg");
        assert_eq!(config.buffer.size_secs, 6.0);
        assert_eq!(config.buffer.refill_secs, 5.0);

        let assets = config.engine.assets();
        assert_eq!(assets.core, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(assets.wasm.as_deref(), Some("core.wasm"));

        let options = config.session_options();
        assert_eq!(options.scheduler.buffer_size_secs, 6.0);
    }

    #[test]
    fn test_refill_larger_than_size_is_rejected() {
        let err = parse_config("[buffer]\nsize_secs = 4.0\nrefill_secs = 5.0\n").unwrap_err();
        assert!(format!("{err:#}").contains("exceeds buffer size"));
    }

    #[test]
    fn test_invalid_playback_settings() {
        assert!(parse_config("[playback]\ntick_ms = 0\n").is_err());
        assert!(parse_config("[playback]\nrate = -1.0\n").is_err());
        assert!(parse_config("[engine]\ncore = \"\"\n").is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[playback]\ntick_ms = 100\nrate = 4.0").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.playback.tick_ms, 100);
        assert_eq!(config.playback.rate, 4.0);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = load_config(Path::new("/nonexistent/jitmux.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_explicit_path_wins() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[buffer]\nsize_secs = 20.0").unwrap();

        let config = load_config_or_default(Some(file.path())).unwrap();
        assert_eq!(config.buffer.size_secs, 20.0);
    }
}
