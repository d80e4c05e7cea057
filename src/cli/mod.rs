//! CLI Module
//!
//! Command-line interface for the Stemforge pipeline.

pub mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Stemforge - stem separation and clip detection pipeline
#[derive(Parser, Debug)]
#[command(name = "stemforge")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (YAML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Use mock separation models instead of the separation bridge
    #[arg(long, global = true)]
    pub mock_models: bool,

    /// Apply completion callbacks to the local recording store instead of
    /// posting them to the backend
    #[arg(long, global = true)]
    pub local_callback: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a separation strategy on one file
    #[command(name = "separate")]
    Separate {
        /// Input WAV file
        input: PathBuf,

        /// Strategy name
        #[arg(short, long, default_value = "four_stem")]
        strategy: String,

        /// Directory for the final stems (defaults to `<input>_stems`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Detect clip boundaries from a directory of stem WAV files
    #[command(name = "detect-clips")]
    DetectClips {
        /// Directory holding one `<stem>.wav` per stem
        stems_dir: PathBuf,

        /// Use a fixed threshold in dB instead of the adaptive one
        #[arg(long, allow_hyphen_values = true)]
        threshold_db: Option<f32>,
    },

    /// Upload a file and register a recording for it
    #[command(name = "create-recording")]
    CreateRecording {
        /// Source audio file
        input: PathBuf,

        /// Processing profile
        #[arg(short, long, default_value = "default")]
        profile: String,

        /// Base name for delivered files (defaults to the input file stem)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Process a recording, resuming from its last checkpoint
    #[command(name = "process")]
    Process {
        /// Recording id
        recording_id: String,
    },

    /// Show recording status
    #[command(name = "status")]
    Status {
        /// Recording id (all recordings when omitted)
        recording_id: Option<String>,
    },

    /// Run a worker job description (JSON file) in the foreground
    #[command(name = "run-job")]
    RunJob {
        /// Path to the job JSON
        job: PathBuf,
    },

    /// Serve worker jobs over HTTP
    #[command(name = "worker")]
    Worker {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8090")]
        listen: SocketAddr,
    },

    /// Print the effective configuration
    #[command(name = "print-config")]
    PrintConfig,
}
