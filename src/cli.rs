use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "jitmux")]
#[command(author, version, about = "Just-in-time remuxing into a progressively filled fMP4 buffer")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Play a file against a simulated clock, filling an fMP4 output as it goes
    Play {
        /// Input file to play
        #[arg(required = true)]
        input: PathBuf,

        /// Output fMP4 file (defaults to <input>.jitmux.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Video stream id, e.g. 0:0 (defaults to the first video stream)
        #[arg(long)]
        video: Option<String>,

        /// Audio stream id, e.g. 0:1 (defaults to the first audio stream)
        #[arg(long)]
        audio: Option<String>,

        /// Stop once playback reaches this position in seconds
        #[arg(long)]
        until: Option<f64>,

        /// Playback rate, overriding the config
        #[arg(long)]
        rate: Option<f64>,
    },

    /// Probe a media file and display its streams
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}
