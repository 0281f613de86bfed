//! Free caption track extraction.
//!
//! Loads the public watch page, pulls the embedded innertube API key, asks the
//! player endpoint for the caption track list, picks the best track and parses
//! its payload. The page/player steps are retried; the payload step is not.

use regex::Regex;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE, USER_AGENT};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod parser;

pub use parser::{parse_caption_payload, CaptionFormat};

use crate::config::Config;
use crate::extractors::watch_url;
use crate::transcribe::{LayerOutput, TranscriptResult, TranscriptSource};
use crate::utils::http::{classify_request_error, classify_status};
use crate::utils::RetryPolicy;
use crate::TranscriptorError;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// A caption track advertised by the player endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub language_code: String,
    pub name: String,
    /// Auto-generated (speech recognition) rather than manually authored
    pub is_generated: bool,
    pub url: String,
}

/// Text recovered from a caption track
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTranscript {
    pub text: String,
    pub language: String,
    pub is_generated: bool,
    pub format: CaptionFormat,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    #[serde(default)]
    captions: Option<PlayerCaptions>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerCaptions {
    #[serde(default)]
    player_captions_tracklist_renderer: Option<Tracklist>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tracklist {
    #[serde(default)]
    caption_tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrack {
    base_url: String,
    #[serde(default)]
    language_code: String,
    #[serde(default)]
    name: Option<TrackName>,
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackName {
    #[serde(default)]
    simple_text: Option<String>,
    #[serde(default)]
    runs: Vec<TextRun>,
}

#[derive(Debug, Deserialize)]
struct TextRun {
    #[serde(default)]
    text: String,
}

impl From<RawTrack> for CaptionTrack {
    fn from(raw: RawTrack) -> Self {
        let name = raw
            .name
            .map(|n| {
                n.simple_text
                    .unwrap_or_else(|| n.runs.into_iter().map(|r| r.text).collect())
            })
            .unwrap_or_else(|| raw.language_code.clone());

        CaptionTrack {
            is_generated: raw.kind.as_deref() == Some("asr"),
            language_code: raw.language_code,
            name,
            url: raw.base_url,
        }
    }
}

fn api_key_pattern() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| {
        Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([A-Za-z0-9_-]+)""#).expect("static api key regex")
    })
}

/// Pull the innertube API key out of a watch page
pub fn extract_api_key(page: &str) -> Option<String> {
    api_key_pattern()
        .captures(page)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn language_matches(code: &str, preferred: &str) -> bool {
    code.eq_ignore_ascii_case(preferred)
        || code
            .split('-')
            .next()
            .is_some_and(|primary| primary.eq_ignore_ascii_case(preferred))
}

/// Manual track in preference order, then generated in preference order, then
/// whatever came first.
pub fn select_track<'a>(tracks: &'a [CaptionTrack], preferred: &[String]) -> Option<&'a CaptionTrack> {
    let pick = |generated: bool| {
        preferred.iter().find_map(|lang| {
            tracks
                .iter()
                .find(|t| t.is_generated == generated && language_matches(&t.language_code, lang))
        })
    };

    pick(false).or_else(|| pick(true)).or_else(|| tracks.first())
}

/// Fetches free caption tracks
pub struct CaptionExtractor {
    http: reqwest::Client,
    base_url: String,
    languages: Vec<String>,
    min_chars: usize,
    retry: RetryPolicy,
    client_name: String,
    client_version: String,
    page_timeout: Duration,
    player_timeout: Duration,
    payload_timeout: Duration,
}

impl CaptionExtractor {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            base_url: config.captions.base_url.trim_end_matches('/').to_string(),
            languages: config.captions.languages.clone(),
            min_chars: config.captions.min_transcript_chars,
            retry: RetryPolicy::new(
                config.captions.retry_attempts,
                Duration::from_millis(config.captions.retry_base_delay_ms),
            ),
            client_name: config.captions.client_name.clone(),
            client_version: config.captions.client_version.clone(),
            page_timeout: config.timeouts.page(),
            player_timeout: config.timeouts.player(),
            payload_timeout: config.timeouts.caption_payload(),
        }
    }

    /// Caption layer contract: one result for the video, `failed` when no usable
    /// captions exist.
    pub async fn fetch_captions(&self, video_id: &str, cancel: &CancellationToken) -> TranscriptResult {
        match self.extract(video_id, cancel).await {
            Ok(captions) => TranscriptResult::success(
                video_id,
                TranscriptSource::FreeCaptions,
                LayerOutput {
                    text: captions.text,
                    language: Some(captions.language),
                    confidence: None,
                    cost: 0.0,
                },
            ),
            Err(e) => TranscriptResult::failed(video_id, e.to_string()),
        }
    }

    /// Full caption pipeline returning typed failures
    pub async fn extract(
        &self,
        video_id: &str,
        cancel: &CancellationToken,
    ) -> Result<CaptionTranscript, TranscriptorError> {
        let tracks = self
            .retry
            .run(cancel, "caption track lookup", || self.list_tracks(video_id))
            .await?;

        let track = select_track(&tracks, &self.languages).ok_or(TranscriptorError::NoCaptions)?;
        tracing::debug!(
            "Using caption track {} ({}{}) for {}",
            track.name,
            track.language_code,
            if track.is_generated { ", auto-generated" } else { "" },
            video_id
        );

        let payload = self.fetch_payload(track).await?;
        let (format, text) = parse_caption_payload(&payload).ok_or_else(|| {
            TranscriptorError::Unusable("caption payload in unrecognised format".to_string())
        })?;

        let length = text.chars().count();
        if length < self.min_chars {
            return Err(TranscriptorError::Unusable(format!(
                "captions too short ({} chars)",
                length
            )));
        }

        tracing::info!("Captions for {}: {} chars ({:?})", video_id, length, format);

        Ok(CaptionTranscript {
            text,
            language: track.language_code.clone(),
            is_generated: track.is_generated,
            format,
        })
    }

    /// Page → API key → player endpoint → track list. One attempt.
    pub async fn list_tracks(&self, video_id: &str) -> Result<Vec<CaptionTrack>, TranscriptorError> {
        let page = self.fetch_watch_page(video_id).await?;
        let api_key = extract_api_key(&page).ok_or_else(|| {
            TranscriptorError::Transient("watch page did not contain an API key".to_string())
        })?;

        let player_url = format!(
            "{}/youtubei/v1/player?key={}&prettyPrint=false",
            self.base_url,
            urlencoding::encode(&api_key)
        );
        let body = serde_json::json!({
            "context": {
                "client": {
                    "clientName": self.client_name,
                    "clientVersion": self.client_version,
                    "hl": "en",
                }
            },
            "videoId": video_id,
        });

        let response = self
            .http
            .post(&player_url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .json(&body)
            .timeout(self.player_timeout)
            .send()
            .await
            .map_err(|e| classify_request_error("player endpoint", &e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| classify_request_error("player endpoint", &e))?;
        if !status.is_success() {
            return Err(classify_status("player endpoint", status, &text));
        }

        let player: PlayerResponse = serde_json::from_str(&text).map_err(|e| {
            TranscriptorError::Transient(format!("player response was not valid JSON: {}", e))
        })?;

        let tracks: Vec<CaptionTrack> = player
            .captions
            .and_then(|c| c.player_captions_tracklist_renderer)
            .map(|t| t.caption_tracks)
            .unwrap_or_default()
            .into_iter()
            .filter(|t| !t.base_url.is_empty())
            .map(CaptionTrack::from)
            .collect();

        if tracks.is_empty() {
            return Err(TranscriptorError::NoCaptions);
        }
        Ok(tracks)
    }

    async fn fetch_watch_page(&self, video_id: &str) -> Result<String, TranscriptorError> {
        let response = self
            .http
            .get(watch_url(&self.base_url, video_id))
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(COOKIE, "CONSENT=YES+cb")
            .timeout(self.page_timeout)
            .send()
            .await
            .map_err(|e| classify_request_error("watch page", &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let err = classify_status("watch page", status, &body);
            // Page-level failures are assumed to be blips worth another try
            return Err(match err {
                TranscriptorError::TranscriptionFailed(msg) => TranscriptorError::Transient(msg),
                other => other,
            });
        }

        response
            .text()
            .await
            .map_err(|e| classify_request_error("watch page", &e))
    }

    async fn fetch_payload(&self, track: &CaptionTrack) -> Result<String, TranscriptorError> {
        let response = self
            .http
            .get(&track.url)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .timeout(self.payload_timeout)
            .send()
            .await
            .map_err(|e| classify_request_error("caption payload", &e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error("caption payload", &e))?;
        if !status.is_success() {
            return Err(classify_status("caption payload", status, &body));
        }
        Ok(body)
    }
}
