use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "clipscribe",
    about = "ClipScribe - Transcripts for short-form videos, captions first and paid speech-to-text only when needed",
    version,
    long_about = "Fetches transcripts for YouTube videos by trying the free caption track first, then falling back to OpenAI Whisper and Deepgram. Accepts explicit video ids/URLs or a pair of topics to discover comparison videos."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a config file (defaults to ./clipscribe.yaml or the user config dir)
    #[arg(long, global = true, value_name = "PATH", env = "CLIPSCRIBE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe videos by id/URL, or discover them from two topics
    Transcribe {
        /// Video ids or watch URLs
        #[arg(value_name = "IDS_OR_URLS", required_unless_present = "topic_a")]
        videos: Vec<String>,

        /// First topic for comparison discovery
        #[arg(long, value_name = "TOPIC", requires = "topic_b", conflicts_with = "videos")]
        topic_a: Option<String>,

        /// Second topic for comparison discovery
        #[arg(long, value_name = "TOPIC", requires = "topic_a")]
        topic_b: Option<String>,

        /// Never call the Whisper API
        #[arg(long)]
        no_whisper: bool,

        /// Never call the Deepgram API
        #[arg(long)]
        no_deepgram: bool,

        /// Maximum number of discovered videos
        #[arg(long, value_name = "COUNT")]
        max_videos: Option<usize>,

        /// Videos processed at the same time
        #[arg(long, value_name = "COUNT", value_parser = clap::value_parser!(u16).range(1..))]
        concurrency: Option<u16>,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Search videos without transcribing them
    Search {
        /// Free-text search query
        query: String,

        /// Maximum number of results
        #[arg(long, default_value = "10", value_name = "COUNT")]
        max_results: usize,
    },

    /// Show configured services, installed tools and the fallback chain
    Status,

    /// Show or create the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text, one block per video
    Text,
    /// JSON report with results and stats
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
