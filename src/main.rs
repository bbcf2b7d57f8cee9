mod cli;

use jitmux::config;
use jitmux::{FfmpegComponents, Session};
use jitmux_av::{
    classify_audio, classify_video, ContainerPolicy, FfmpegEngine, MediaMetadata,
    StreamDescriptor, TranscodeWorker,
};
use jitmux_common::{MediaKind, StreamId};

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Ticks without progress before the simulated player gives up.
const STALL_TICKS: u32 = 40;

/// Ticks without progress before giving up even with a chunk in flight.
const MAX_STALL_TICKS: u32 = STALL_TICKS * 12;

/// Distance from the end at which a stalled player counts as finished.
const END_TOLERANCE_SECS: f64 = 1.0;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "jitmux=trace,jitmux_av=trace,jitmux_media=debug".to_string()
        } else {
            "jitmux=info,jitmux_av=info,jitmux_media=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Play {
            input,
            output,
            video,
            audio,
            until,
            rate,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(play(PlayArgs {
                input,
                output,
                video,
                audio,
                until,
                rate,
                config_path: cli.config,
            }))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("jitmux {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

struct PlayArgs {
    input: PathBuf,
    output: Option<PathBuf>,
    video: Option<String>,
    audio: Option<String>,
    until: Option<f64>,
    rate: Option<f64>,
    config_path: Option<PathBuf>,
}

fn parse_stream_id(id: &str) -> Result<StreamId> {
    id.parse::<StreamId>()
        .map_err(|e| anyhow::anyhow!("Invalid stream id {:?}: {}", id, e))
}

async fn play(args: PlayArgs) -> Result<()> {
    let config = config::load_config_or_default(args.config_path.as_deref())?;

    if !args.input.exists() {
        anyhow::bail!("Input file does not exist: {:?}", args.input);
    }

    let rate = args.rate.unwrap_or(config.playback.rate);
    if !(rate > 0.0) {
        anyhow::bail!("Playback rate must be positive, got {}", rate);
    }

    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("jitmux.mp4"));
    let components = FfmpegComponents::new(&config.engine.transmuxer, &output);

    let mut session = Session::new(components, config.session_options())?;
    session.add_log_callback(|line| println!("{line}"));

    let loaded = session.load_media(&args.input).await?;

    let metadata = session.metadata().context("Media metadata missing after load")?;
    let video = match args.video.as_deref() {
        Some(id) => parse_stream_id(id)?,
        None => metadata
            .primary_video()
            .map(|s| s.id.clone())
            .context("Input has no video stream")?,
    };
    let audio = match args.audio.as_deref() {
        Some(id) => Some(parse_stream_id(id)?),
        None => metadata.primary_audio().map(|s| s.id.clone()),
    };

    println!("Output: {}", loaded.source);
    session.start(&video, audio.as_ref()).await?;

    let end = args
        .until
        .map_or(loaded.duration_secs, |until| until.min(loaded.duration_secs));
    let tick = Duration::from_millis(config.playback.tick_ms);
    let step = tick.as_secs_f64() * rate;

    let scheduler = session.scheduler()?;
    let (error_tx, mut error_rx) = mpsc::unbounded_channel();
    let mut interval = tokio::time::interval(tick);
    let mut position = 0.0_f64;
    let mut stalled = 0u32;

    tracing::info!(end, rate, "Starting simulated playback");

    loop {
        interval.tick().await;

        if let Ok(e) = error_rx.try_recv() {
            return Err(anyhow::Error::new(e).context(format!("Playback failed at {position:.2}s")));
        }

        let buffered = scheduler.buffered();
        match buffered.find(position) {
            Some(range) if position < range.end => {
                position = (position + step).min(range.end).min(end);
                stalled = 0;
            }
            _ => stalled += 1,
        }

        // Position updates run concurrently with chunk fetches, like a
        // player's clock would.
        let updater = scheduler.clone();
        let errors = error_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = updater.on_time_advance(position).await {
                let _ = errors.send(e);
            }
        });

        if position >= end {
            break;
        }

        if stalled >= STALL_TICKS {
            if end - position <= END_TOLERANCE_SECS {
                break;
            }
            if scheduler.in_flight().is_none() || stalled >= MAX_STALL_TICKS {
                anyhow::bail!(
                    "Playback stalled at {:.2}s (buffered: {})",
                    position,
                    buffered
                );
            }
        }
    }

    println!("Reached {:.2}s of {:.2}s", position, loaded.duration_secs);
    println!("Buffered: {}", scheduler.buffered());
    println!("Output: {}", output.display());

    session.reset();
    Ok(())
}

#[derive(Serialize)]
struct StreamReport<'a> {
    kind: MediaKind,
    #[serde(flatten)]
    stream: &'a StreamDescriptor,
    policy: Option<ContainerPolicy>,
    unsupported: Option<String>,
}

#[derive(Serialize)]
struct ProbeReport<'a> {
    file: &'a Path,
    duration_secs: f64,
    streams: Vec<StreamReport<'a>>,
}

fn stream_reports(metadata: &MediaMetadata) -> Vec<StreamReport<'_>> {
    let video = metadata
        .video_streams
        .iter()
        .map(|s| (MediaKind::Video, s, classify_video(&s.format_description)));
    let audio = metadata
        .audio_streams
        .iter()
        .map(|s| (MediaKind::Audio, s, classify_audio(&s.format_description)));

    video
        .chain(audio)
        .map(|(kind, stream, policy)| match policy {
            Ok(policy) => StreamReport {
                kind,
                stream,
                policy: Some(policy),
                unsupported: None,
            },
            Err(e) => StreamReport {
                kind,
                stream,
                policy: None,
                unsupported: Some(e.to_string()),
            },
        })
        .collect()
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = config::load_config_or_default(config_path)?;

    let mut worker = TranscodeWorker::new(FfmpegEngine::new());
    worker.load(config.engine.assets()).await?;
    let probed = worker.set_input_file(file).await;
    worker.terminate();
    let metadata = probed?;

    let report = ProbeReport {
        file,
        duration_secs: metadata.duration_secs,
        streams: stream_reports(&metadata),
    };

    if json {
        let json_str = serde_json::to_string_pretty(&report)?;
        println!("{}", json_str);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Duration: {:.2}s", report.duration_secs);
    println!("\nStreams: {}", report.streams.len());
    for stream in &report.streams {
        print!(
            "  [{}] {} ({}): {}",
            stream.stream.id,
            stream.kind,
            stream.stream.language.as_deref().unwrap_or("n/a"),
            stream.stream.format_description
        );
        match (&stream.policy, &stream.unsupported) {
            (Some(policy), _) if policy.convert => {
                let codec = policy
                    .target_codec
                    .as_ref()
                    .map(|c| c.to_string())
                    .unwrap_or_default();
                print!(" -> transcode to {}", codec);
            }
            (Some(_), _) => print!(" -> copy"),
            (None, Some(reason)) => print!(" -> unsupported: {}", reason),
            (None, None) => {}
        }
        println!();
    }

    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    println!("Checking external tools...\n");

    let tools = jitmux_av::check_tools(&config.engine.core, &config.engine.transmuxer);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install them to enable playback.");
    }

    Ok(())
}

fn print_config(config: &config::Config) {
    println!("  Engine: {}", config.engine.core);
    if let Some(ref wasm) = config.engine.wasm {
        println!("  Engine module: {}", wasm);
    }
    println!("  Transmuxer: {}", config.engine.transmuxer);
    println!(
        "  Buffer: {}s chunks, refill below {}s",
        config.buffer.size_secs, config.buffer.refill_secs
    );
    println!(
        "  Playback: {}ms ticks at {}x",
        config.playback.tick_ms, config.playback.rate
    );
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            println!("Default config:");
            print_config(&config::Config::default());
        }
    }

    Ok(())
}
