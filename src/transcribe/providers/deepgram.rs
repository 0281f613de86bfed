use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use super::{ensure_speech, mime_for, read_audio, RawTranscript, SpeechToText};
use crate::config::ServiceConfig;
use crate::utils::http::{classify_request_error, classify_status};
use crate::TranscriptorError;

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    detected_language: Option<String>,
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Deepgram pre-recorded audio client
///
/// Cheaper per minute than Whisper and handles code-switched speech well, so it
/// sits after Whisper only when Whisper is unavailable or fails.
pub struct DeepgramClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    rate_per_minute: f64,
    max_upload_bytes: u64,
    timeout: Duration,
}

impl DeepgramClient {
    pub fn new(
        http: reqwest::Client,
        config: &ServiceConfig,
        timeout: Duration,
    ) -> Result<Self, TranscriptorError> {
        let api_key = config
            .api_key()
            .ok_or_else(|| TranscriptorError::NotConfigured("Deepgram API key missing".to_string()))?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            endpoint: format!("{}/v1/listen", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            rate_per_minute: config.rate_per_minute,
            max_upload_bytes: config.max_upload_bytes,
            timeout,
        })
    }
}

#[async_trait]
impl SpeechToText for DeepgramClient {
    fn name(&self) -> &'static str {
        "deepgram"
    }

    fn rate_per_minute(&self) -> f64 {
        self.rate_per_minute
    }

    fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }

    async fn transcribe(&self, audio_path: &Path) -> Result<RawTranscript, TranscriptorError> {
        let bytes = read_audio(audio_path).await?;
        tracing::debug!("Uploading {} bytes to Deepgram ({})", bytes.len(), self.model);

        let response = self
            .http
            .post(&self.endpoint)
            .query(&[
                ("model", self.model.as_str()),
                ("smart_format", "true"),
                ("punctuate", "true"),
                ("detect_language", "true"),
            ])
            .header(AUTHORIZATION, format!("Token {}", self.api_key))
            .header(CONTENT_TYPE, mime_for(audio_path))
            .body(bytes)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_request_error("deepgram", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error("deepgram", &e))?;
        if !status.is_success() {
            return Err(classify_status("deepgram", status, &body));
        }

        let parsed: ListenResponse = serde_json::from_str(&body).map_err(|e| {
            TranscriptorError::TranscriptionFailed(format!("unexpected deepgram response: {}", e))
        })?;

        let channel = parsed.results.channels.into_iter().next();
        let language = channel.as_ref().and_then(|c| c.detected_language.clone());
        let best = channel.and_then(|c| c.alternatives.into_iter().next());
        let (text, confidence) = best
            .map(|alt| (alt.transcript, alt.confidence))
            .unwrap_or_default();

        Ok(RawTranscript {
            text: ensure_speech("deepgram", text)?,
            language,
            confidence,
        })
    }
}
