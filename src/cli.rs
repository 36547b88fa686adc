use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register a video as a new task and list its streams
    Analyze {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Run the pipeline for an analyzed task
    Process {
        /// Task id printed by `analyze`
        #[arg(short, long)]
        task: String,

        /// Subtitle source: extract or transcribe
        #[arg(short, long, default_value = "transcribe")]
        mode: String,

        /// Absolute stream index of the subtitle stream to extract
        #[arg(short, long)]
        stream: Option<usize>,
    },

    /// Analyze and process a video in one go
    Run {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Subtitle source: extract or transcribe
        #[arg(short, long, default_value = "transcribe")]
        mode: String,

        /// Absolute stream index of the subtitle stream to extract
        #[arg(short, long)]
        stream: Option<usize>,
    },

    /// Print a task record as JSON
    Status {
        #[arg(short, long)]
        task: String,
    },

    /// Split audio into fixed-length chunks
    Split {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,

        /// Directory that receives the chunks
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Chunk length, overrides the configured value
        #[arg(long)]
        segment_seconds: Option<u32>,
    },

    /// Split, transcribe in parallel and merge into one SRT
    Transcribe {
        /// Input audio file
        #[arg(short, long)]
        input: PathBuf,

        /// Output SRT file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Translate an SRT file in parallel groups
    Translate {
        /// Input SRT file
        #[arg(short, long)]
        input: PathBuf,

        /// Output SRT file
        #[arg(short, long)]
        output: PathBuf,

        /// Target language, overrides the configured value
        #[arg(long)]
        target_lang: Option<String>,
    },
}
