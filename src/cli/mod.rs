use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::pipeline::TranscriptMode;

#[derive(Parser)]
#[command(
    name = "clipscribe",
    about = "Clipscribe - extract transcripts from video share links",
    version,
    long_about = "Extract the spoken content of a video behind a share link, either from platform captions and description text or by downloading the audio track and running it through a remote speech-to-text service."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract a transcript from a video share link
    Transcribe {
        /// Share link of the video
        #[arg(value_name = "URL")]
        url: String,

        /// API key for the transcription service (speech mode only)
        #[arg(short = 'k', long, env = "CLIPSCRIBE_API_KEY", value_name = "KEY")]
        api_key: Option<String>,

        /// Where the transcript comes from
        #[arg(short, long, value_enum, default_value = "speech")]
        mode: Mode,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show or initialize the configuration
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum Mode {
    /// Platform captions or description text; no audio work
    Description,
    /// Speech-to-text over the extracted audio track
    Speech,
}

impl From<Mode> for TranscriptMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Description => TranscriptMode::Description,
            Mode::Speech => TranscriptMode::Speech,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON with segments
    Json,
    /// SRT subtitle format
    Srt,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Srt => write!(f, "srt"),
        }
    }
}
