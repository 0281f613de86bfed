use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::{ensure_speech, mime_for, read_audio, RawTranscript, SpeechToText};
use crate::config::ServiceConfig;
use crate::utils::http::{classify_request_error, classify_status};
use crate::TranscriptorError;

/// `verbose_json` response of the transcription endpoint
#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    avg_logprob: Option<f64>,
}

/// OpenAI Whisper transcription API client
pub struct WhisperClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    rate_per_minute: f64,
    max_upload_bytes: u64,
    timeout: Duration,
}

impl WhisperClient {
    pub fn new(
        http: reqwest::Client,
        config: &ServiceConfig,
        timeout: Duration,
    ) -> Result<Self, TranscriptorError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| TranscriptorError::NotConfigured("OpenAI API key missing".to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: format!("{}/v1/audio/transcriptions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            rate_per_minute: config.rate_per_minute,
            max_upload_bytes: config.max_upload_bytes,
            timeout,
        })
    }
}

/// Mean per-segment probability, when the service reports log-probabilities
fn confidence_from_segments(segments: &[WhisperSegment]) -> Option<f64> {
    let probs: Vec<f64> = segments
        .iter()
        .filter_map(|s| s.avg_logprob)
        .map(|lp| lp.exp().clamp(0.0, 1.0))
        .collect();

    if probs.is_empty() {
        None
    } else {
        Some(probs.iter().sum::<f64>() / probs.len() as f64)
    }
}

#[async_trait]
impl SpeechToText for WhisperClient {
    fn name(&self) -> &'static str {
        "whisper"
    }

    fn rate_per_minute(&self) -> f64 {
        self.rate_per_minute
    }

    fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<RawTranscript, TranscriptorError> {
        let bytes = read_audio(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        tracing::debug!("Uploading {} bytes to Whisper ({})", bytes.len(), self.model);

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_for(audio_path))
            .map_err(|e| TranscriptorError::TranscriptionFailed(format!("invalid upload part: {}", e)))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_request_error("whisper", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error("whisper", &e))?;
        if !status.is_success() {
            return Err(classify_status("whisper", status, &body));
        }

        let parsed: WhisperResponse = serde_json::from_str(&body).map_err(|e| {
            TranscriptorError::TranscriptionFailed(format!("unexpected whisper response: {}", e))
        })?;

        Ok(RawTranscript {
            text: ensure_speech("whisper", parsed.text)?,
            language: parsed.language,
            confidence: confidence_from_segments(&parsed.segments),
        })
    }
}
