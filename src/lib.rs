//! ClipScribe - layered transcript acquisition for short-form videos
//!
//! This library produces one transcript outcome per video identifier by trying the
//! free caption track first and falling back to paid speech-to-text services
//! (OpenAI Whisper, then Deepgram) only when captions are missing or unusable.

pub mod captions;
pub mod cli;
pub mod config;
pub mod extractors;
pub mod output;
pub mod process;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use extractors::{AudioAsset, AudioFetcher, VideoRef};
pub use transcribe::{
    BatchReport, TranscriptResult, TranscriptSource, TranscriptionEngine, TranscriptionRequest,
    TranscriptionStats,
};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// Error types specific to the transcriptor
///
/// Variants follow the failure taxonomy the orchestrator reasons about: content
/// facts are never retried, transient faults are retried with backoff, and
/// configuration gaps short-circuit a layer without consuming retries.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TranscriptorError {
    #[error("no captions available")]
    NoCaptions,

    #[error("unusable result: {0}")]
    Unusable(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("audio extraction failed: {0}")]
    AudioExtractionFailed(String),

    #[error("external tool failed: {0}")]
    ToolFailed(String),

    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("cancelled")]
    Cancelled,
}

impl TranscriptorError {
    /// Only transient faults are worth waiting and repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranscriptorError::Transient(_))
    }
}
