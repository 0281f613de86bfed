use async_trait::async_trait;
use std::path::Path;

pub mod deepgram;
pub mod whisper;

pub use deepgram::DeepgramClient;
pub use whisper::WhisperClient;

use crate::TranscriptorError;

/// Bytes per minute of audio assumed when only the file size is known
/// (128 kbit/s mp3). Cost estimates use this instead of probing real duration.
pub const ASSUMED_BYTES_PER_MINUTE: f64 = 128_000.0 / 8.0 * 60.0;

/// Transcripts with fewer characters than this come from silent or music-only audio
pub const NEAR_EMPTY_CHARS: usize = 10;

/// Raw output of a speech-to-text service
#[derive(Debug, Clone, PartialEq)]
pub struct RawTranscript {
    pub text: String,
    pub language: Option<String>,
    pub confidence: Option<f64>,
}

/// A paid speech-to-text service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Short provider name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Price per audio minute
    fn rate_per_minute(&self) -> f64;

    /// Largest file accepted in one request
    fn max_upload_bytes(&self) -> u64;

    /// Transcribe a local audio file. Near-empty output is an error.
    async fn transcribe(&self, audio_path: &Path) -> Result<RawTranscript, TranscriptorError>;
}

/// Estimated minutes of audio in a file of `bytes` bytes
pub fn estimated_minutes(bytes: u64) -> f64 {
    bytes as f64 / ASSUMED_BYTES_PER_MINUTE
}

/// Cost of transcribing `bytes` of audio at `rate_per_minute`
pub fn estimate_cost(bytes: u64, rate_per_minute: f64) -> f64 {
    estimated_minutes(bytes) * rate_per_minute
}

/// Reject near-empty transcripts
pub(crate) fn ensure_speech(service: &str, text: String) -> Result<String, TranscriptorError> {
    let text = crate::utils::normalize_whitespace(&text);
    if text.chars().count() < NEAR_EMPTY_CHARS {
        return Err(TranscriptorError::Unusable(format!(
            "{} returned near-empty text (likely silent or music-only)",
            service
        )));
    }
    Ok(text)
}

pub(crate) async fn read_audio(path: &Path) -> Result<Vec<u8>, TranscriptorError> {
    tokio::fs::read(path).await.map_err(|e| {
        TranscriptorError::AudioExtractionFailed(format!("cannot read {}: {}", path.display(), e))
    })
}

pub(crate) fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("webm") => "audio/webm",
        Some("ogg") | Some("opus") => "audio/ogg",
        Some("flac") => "audio/flac",
        _ => "audio/mpeg",
    }
}
