use anyhow::Context;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::batch::{BatchReport, BatchScheduler};
use super::chunking::ChunkingCoordinator;
use super::layers::{CaptionLayer, PaidLayer, TranscriptionLayer};
use super::orchestrator::Orchestrator;
use super::providers::deepgram::DeepgramClient;
use super::providers::whisper::WhisperClient;
use super::providers::SpeechToText;
use super::{TranscriptResult, TranscriptSource};
use crate::captions::CaptionExtractor;
use crate::config::Config;
use crate::extractors::search::comparison_queries;
use crate::extractors::{AudioFetcher, VideoRef, YoutubeAudioFetcher, YoutubeSearch};
use crate::process::{tool_version, CommandRunner, TokioCommandRunner};
use crate::utils::{extract_video_id, RetryPolicy};
use crate::{Result, TranscriptorError};

/// What to transcribe and which layers may be used
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionRequest {
    /// Video ids or watch URLs
    pub video_ids: Vec<String>,

    /// Topic pair used to discover videos when no ids are given
    pub topics: Option<(String, String)>,

    pub use_whisper: bool,
    pub use_deepgram: bool,

    /// Cap on discovered videos (defaults to the configured value)
    pub max_videos: Option<usize>,

    /// Videos processed at once (defaults to the configured value)
    pub concurrency: Option<usize>,
}

impl Default for TranscriptionRequest {
    fn default() -> Self {
        Self {
            video_ids: Vec::new(),
            topics: None,
            use_whisper: true,
            use_deepgram: true,
            max_videos: None,
            concurrency: None,
        }
    }
}

impl TranscriptionRequest {
    pub fn for_videos<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            video_ids: ids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn for_topics(topic_a: &str, topic_b: &str) -> Self {
        Self {
            topics: Some((topic_a.to_string(), topic_b.to_string())),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub configured: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolStatus {
    pub name: String,
    pub installed: bool,
    pub version: Option<String>,
}

/// Diagnostics for the status command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub services: Vec<ServiceStatus>,
    pub tools: Vec<ToolStatus>,
    /// Layers in the order they are tried
    pub fallback_chain: Vec<String>,
}

impl EngineStatus {
    /// True when at least one layer besides free captions can run
    pub fn has_paid_fallback(&self) -> bool {
        self.services.iter().any(|s| s.configured)
    }
}

/// Entry point tying configuration, layers and scheduling together
pub struct TranscriptionEngine {
    config: Config,
    runner: Arc<dyn CommandRunner>,
    captions: Arc<CaptionExtractor>,
    fetcher: Arc<dyn AudioFetcher>,
    chunker: Arc<ChunkingCoordinator>,
    whisper: Option<Arc<dyn SpeechToText>>,
    deepgram: Option<Arc<dyn SpeechToText>>,
    search: YoutubeSearch,
}

impl TranscriptionEngine {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_runner(config, Arc::new(TokioCommandRunner::new()))
    }

    /// Build the engine over a specific command runner
    pub fn with_runner(config: Config, runner: Arc<dyn CommandRunner>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .context("Failed to build HTTP client")?;

        let transcription_timeout = config.timeouts.transcription();
        let whisper = WhisperClient::new(http.clone(), &config.whisper, transcription_timeout)
            .ok()
            .map(|c| Arc::new(c) as Arc<dyn SpeechToText>);
        let deepgram = DeepgramClient::new(http.clone(), &config.deepgram, transcription_timeout)
            .ok()
            .map(|c| Arc::new(c) as Arc<dyn SpeechToText>);

        if whisper.is_none() && deepgram.is_none() {
            tracing::info!("No paid transcription service configured; captions only");
        }

        Ok(Self {
            captions: Arc::new(CaptionExtractor::new(http, &config)),
            fetcher: Arc::new(YoutubeAudioFetcher::new(runner.clone(), &config)),
            chunker: Arc::new(ChunkingCoordinator::new(runner.clone(), &config)),
            search: YoutubeSearch::new(runner.clone(), &config),
            whisper,
            deepgram,
            runner,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn paid_retry(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.config.captions.retry_attempts,
            Duration::from_millis(self.config.captions.retry_base_delay_ms),
        )
    }

    /// Layers in priority order; a paid layer switched off by the request
    /// stays in the chain as disabled so it shows up in the failure summary.
    pub fn layers(&self, use_whisper: bool, use_deepgram: bool) -> Vec<Arc<dyn TranscriptionLayer>> {
        let pick = |client: &Option<Arc<dyn SpeechToText>>, wanted: bool| {
            if wanted {
                client.clone()
            } else {
                None
            }
        };

        vec![
            Arc::new(CaptionLayer::new(self.captions.clone())),
            Arc::new(PaidLayer::new(
                TranscriptSource::PaidWhisper,
                pick(&self.whisper, use_whisper),
                self.chunker.clone(),
                self.paid_retry(),
            )),
            Arc::new(PaidLayer::new(
                TranscriptSource::PaidDeepgram,
                pick(&self.deepgram, use_deepgram),
                self.chunker.clone(),
                self.paid_retry(),
            )),
        ]
    }

    pub async fn run(&self, request: TranscriptionRequest, cancel: &CancellationToken) -> Result<BatchReport> {
        self.run_with_progress(request, cancel, None).await
    }

    /// Resolve the request to video ids and transcribe them as one batch
    pub async fn run_with_progress(
        &self,
        request: TranscriptionRequest,
        cancel: &CancellationToken,
        progress: Option<ProgressBar>,
    ) -> Result<BatchReport> {
        let targets = self.resolve_targets(&request, cancel).await?;
        let video_ids: Vec<String> = targets.iter().filter_map(|t| t.as_ref().ok().cloned()).collect();
        let concurrency = request.concurrency.unwrap_or(self.config.batch.concurrency).max(1);

        tracing::info!(
            "Transcribing {} videos (concurrency {}, whisper {}, deepgram {})",
            video_ids.len(),
            concurrency,
            if request.use_whisper { "on" } else { "off" },
            if request.use_deepgram { "on" } else { "off" }
        );

        let orchestrator = Orchestrator::new(
            self.layers(request.use_whisper, request.use_deepgram),
            self.fetcher.clone(),
            &self.config.work_root(),
            self.config.captions.min_transcript_chars,
        );
        let mut scheduler = BatchScheduler::new(
            Arc::new(orchestrator),
            Duration::from_millis(self.config.batch.pacing_delay_ms),
        );
        if let Some(pb) = progress {
            scheduler = scheduler.with_progress(pb);
        }

        let report = scheduler.transcribe_batch(&video_ids, concurrency, cancel).await;
        if video_ids.len() == targets.len() {
            return Ok(report);
        }

        // Put rejected inputs back in their original positions
        let elapsed = Duration::from_secs_f64(report.stats.elapsed_secs);
        let mut transcribed = report.results.into_iter();
        let results = targets
            .into_iter()
            .map(|target| match target {
                Ok(id) => transcribed
                    .next()
                    .unwrap_or_else(|| TranscriptResult::failed(&id, "no result produced")),
                Err(rejected) => rejected,
            })
            .collect();

        Ok(BatchReport {
            run_id: report.run_id,
            ..BatchReport::new(results, elapsed)
        })
    }

    /// One entry per requested video: the id to transcribe, or a failed result
    /// for input that is not a recognisable video id or URL
    async fn resolve_targets(
        &self,
        request: &TranscriptionRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<std::result::Result<String, TranscriptResult>>> {
        if !request.video_ids.is_empty() {
            return Ok(request
                .video_ids
                .iter()
                .map(|input| {
                    extract_video_id(input).map_err(|e| {
                        tracing::warn!("Skipping {:?}: {}", input, e);
                        TranscriptResult::failed(input, e.to_string())
                    })
                })
                .collect());
        }

        let (topic_a, topic_b) = request
            .topics
            .as_ref()
            .context("Provide video ids or a pair of topics")?;
        if topic_a.trim().is_empty() || topic_b.trim().is_empty() {
            anyhow::bail!("Both topics must be non-empty");
        }

        let videos = self
            .discover(topic_a, topic_b, request.max_videos.unwrap_or(self.config.batch.max_videos), cancel)
            .await;
        Ok(videos.into_iter().map(|v| Ok(v.id)).collect())
    }

    /// Find candidate videos comparing two topics
    pub async fn discover(
        &self,
        topic_a: &str,
        topic_b: &str,
        max_videos: usize,
        cancel: &CancellationToken,
    ) -> Vec<VideoRef> {
        let queries = comparison_queries(topic_a, topic_b);
        self.search
            .discover(
                &queries,
                self.config.batch.results_per_query,
                self.config.batch.max_duration_secs,
                max_videos,
                cancel,
            )
            .await
    }

    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<VideoRef>, TranscriptorError> {
        self.search.search(query, max_results, cancel).await
    }

    pub async fn status(&self) -> EngineStatus {
        let services = vec![
            ServiceStatus {
                name: "whisper".to_string(),
                configured: self.whisper.is_some(),
            },
            ServiceStatus {
                name: "deepgram".to_string(),
                configured: self.deepgram.is_some(),
            },
        ];

        let mut tools = Vec::new();
        for (program, flag) in [
            (self.config.audio.downloader.as_str(), "--version"),
            (self.config.audio.segmenter.as_str(), "-version"),
        ] {
            let version = tool_version(self.runner.as_ref(), program, flag).await;
            tools.push(ToolStatus {
                name: program.to_string(),
                installed: version.is_some(),
                version,
            });
        }

        let fallback_chain = self
            .layers(true, true)
            .iter()
            .map(|layer| {
                if layer.is_enabled() {
                    layer.source().to_string()
                } else {
                    format!("{} (disabled: no credentials)", layer.source())
                }
            })
            .collect();

        EngineStatus {
            services,
            tools,
            fallback_chain,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, MockCommandRunner};

    fn config_with_whisper() -> Config {
        let mut config = Config::default();
        config.whisper.api_key = Some("sk-test".to_string());
        config.deepgram.api_key = None;
        config
    }

    #[tokio::test]
    async fn test_status_reports_services_tools_and_chain() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(2).returning(|spec, _| {
            if spec.program == "yt-dlp" {
                Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    stdout: "2024.08.06\n".to_string(),
                    ..Default::default()
                })
            } else {
                Err(TranscriptorError::NotConfigured("ffmpeg is not installed".to_string()))
            }
        });

        let engine = TranscriptionEngine::with_runner(config_with_whisper(), Arc::new(runner)).unwrap();
        let status = engine.status().await;

        assert!(status.services[0].configured);
        assert!(!status.services[1].configured);
        assert!(status.has_paid_fallback());
        assert_eq!(status.tools[0].version.as_deref(), Some("2024.08.06"));
        assert!(!status.tools[1].installed);
        assert_eq!(
            status.fallback_chain,
            vec![
                "free-captions".to_string(),
                "paid-whisper".to_string(),
                "paid-deepgram (disabled: no credentials)".to_string(),
            ]
        );
    }

    #[test]
    fn test_request_flags_disable_layers() {
        let engine =
            TranscriptionEngine::with_runner(config_with_whisper(), Arc::new(MockCommandRunner::new())).unwrap();

        let enabled: Vec<bool> = engine.layers(false, true).iter().map(|l| l.is_enabled()).collect();
        assert_eq!(enabled, vec![true, false, false]);

        let enabled: Vec<bool> = engine.layers(true, true).iter().map(|l| l.is_enabled()).collect();
        assert_eq!(enabled, vec![true, true, false]);
    }

    #[tokio::test]
    async fn test_request_needs_ids_or_topics() {
        let engine =
            TranscriptionEngine::with_runner(Config::default(), Arc::new(MockCommandRunner::new())).unwrap();
        let err = engine
            .run(TranscriptionRequest::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("topics"));
    }

    #[tokio::test]
    async fn test_malformed_ids_fail_in_place() {
        // unmatched requests get 404, so every caption lookup fails fast
        let server = wiremock::MockServer::start().await;
        let work = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.captions.base_url = server.uri();
        config.captions.retry_attempts = 1;
        config.batch.pacing_delay_ms = 0;
        config.app.temp_dir = Some(work.path().to_path_buf());

        // no paid credentials, so no external tool is ever run
        let engine = TranscriptionEngine::with_runner(config, Arc::new(MockCommandRunner::new())).unwrap();
        let report = engine
            .run(
                TranscriptionRequest::for_videos(["dQw4w9WgXcQ", "not-a-valid-id!", "https://vimeo.com/123", "aaaaaaaaaaa"]),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let ids: Vec<&str> = report.results.iter().map(|r| r.video_id.as_str()).collect();
        assert_eq!(ids, vec!["dQw4w9WgXcQ", "not-a-valid-id!", "https://vimeo.com/123", "aaaaaaaaaaa"]);
        assert!(report.results.iter().all(|r| r.source == TranscriptSource::Failed));
        assert!(report.results[1].error.as_deref().unwrap().contains("Not a video id or URL"));
        assert!(report.results[2].error.as_deref().unwrap().contains("Unsupported host"));
        assert!(report.results[0].error.as_deref().unwrap().starts_with("free-captions:"));
        assert_eq!(report.stats.total, 4);
        assert_eq!(report.stats.count(TranscriptSource::Failed), 4);
    }

    #[tokio::test]
    async fn test_topic_discovery_with_no_hits_yields_empty_report() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(4).returning(|spec, _| {
            assert!(spec.args.last().unwrap().starts_with("ytsearch5:"));
            Ok(CommandOutput {
                success: true,
                code: Some(0),
                ..Default::default()
            })
        });

        let engine = TranscriptionEngine::with_runner(Config::default(), Arc::new(runner)).unwrap();
        let report = engine
            .run(
                TranscriptionRequest::for_topics("Classic 350", "Hunter 350"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(report.results.is_empty());
        assert_eq!(report.stats.total, 0);
    }
}
