use serde::{Deserialize, Serialize};
use std::fmt;

pub mod batch;
pub mod chunking;
pub mod engine;
pub mod layers;
pub mod orchestrator;
pub mod providers;
pub mod stats;

pub use batch::{BatchReport, BatchScheduler, VideoTranscriber};
pub use chunking::ChunkingCoordinator;
pub use engine::{EngineStatus, ServiceStatus, ToolStatus, TranscriptionEngine, TranscriptionRequest};
pub use layers::{CaptionLayer, LayerOutput, PaidLayer, TranscriptionLayer, VideoContext};
pub use orchestrator::Orchestrator;
pub use providers::{RawTranscript, SpeechToText};
pub use stats::TranscriptionStats;

/// Which layer produced a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptSource {
    FreeCaptions,
    PaidWhisper,
    PaidDeepgram,
    Failed,
}

impl TranscriptSource {
    pub const ALL: [TranscriptSource; 4] = [
        TranscriptSource::FreeCaptions,
        TranscriptSource::PaidWhisper,
        TranscriptSource::PaidDeepgram,
        TranscriptSource::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TranscriptSource::FreeCaptions => "free-captions",
            TranscriptSource::PaidWhisper => "paid-whisper",
            TranscriptSource::PaidDeepgram => "paid-deepgram",
            TranscriptSource::Failed => "failed",
        }
    }
}

impl fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome for one video identifier
///
/// Built only through [`TranscriptResult::success`] and [`TranscriptResult::failed`]
/// so that `source == Failed` holds exactly when `transcript` is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptResult {
    pub video_id: String,

    pub transcript: Option<String>,

    pub source: TranscriptSource,

    /// Detected or caption track language
    pub language: Option<String>,

    /// Provider confidence (0.0 to 1.0)
    pub confidence: Option<f64>,

    /// Estimated spend in currency units
    pub cost_estimate: Option<f64>,

    pub error: Option<String>,
}

impl TranscriptResult {
    pub fn success(video_id: &str, source: TranscriptSource, output: LayerOutput) -> Self {
        debug_assert!(source != TranscriptSource::Failed);
        Self {
            video_id: video_id.to_string(),
            transcript: Some(output.text),
            source,
            language: output.language,
            confidence: output.confidence,
            cost_estimate: Some(output.cost),
            error: None,
        }
    }

    pub fn failed(video_id: &str, error: impl Into<String>) -> Self {
        Self {
            video_id: video_id.to_string(),
            transcript: None,
            source: TranscriptSource::Failed,
            language: None,
            confidence: None,
            cost_estimate: None,
            error: Some(error.into()),
        }
    }

    /// Replace the cost with the total spent on the video, including layers
    /// whose output was discarded
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost_estimate = Some(cost);
        self
    }

    pub fn is_success(&self) -> bool {
        self.transcript.is_some()
    }
}
