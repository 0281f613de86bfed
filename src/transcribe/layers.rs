use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::chunking::ChunkingCoordinator;
use super::providers::{estimate_cost, SpeechToText};
use super::TranscriptSource;
use crate::captions::CaptionExtractor;
use crate::extractors::{AudioAsset, AudioFetcher};
use crate::utils::RetryPolicy;
use crate::TranscriptorError;

/// Text produced by one layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerOutput {
    pub text: String,
    pub language: Option<String>,
    pub confidence: Option<f64>,
    /// Estimated spend in currency units (zero for free captions)
    pub cost: f64,
}

/// Audio state for one video; downloaded at most once
#[derive(Debug)]
enum AudioSlot {
    NotFetched,
    Ready(AudioAsset),
    Unavailable,
}

/// Per-video state shared by the layers of one orchestrator run
pub struct VideoContext {
    video_id: String,
    work_dir: PathBuf,
    audio: AudioSlot,
    fetcher: Arc<dyn AudioFetcher>,
    cancel: CancellationToken,
    spent: f64,
}

impl VideoContext {
    pub fn new(
        video_id: &str,
        work_dir: &Path,
        fetcher: Arc<dyn AudioFetcher>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            video_id: video_id.to_string(),
            work_dir: work_dir.to_path_buf(),
            audio: AudioSlot::NotFetched,
            fetcher,
            cancel,
            spent: 0.0,
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Record money spent on this video, whether or not the output is kept
    pub fn charge(&mut self, cost: f64) {
        if cost > 0.0 {
            self.spent += cost;
        }
    }

    /// Everything charged so far across all layers
    pub fn spent(&self) -> f64 {
        self.spent
    }

    /// The video's audio, downloading it on first use. Later layers reuse the
    /// file, and a failed download is not repeated.
    pub async fn audio(&mut self) -> Result<AudioAsset, TranscriptorError> {
        if matches!(self.audio, AudioSlot::NotFetched) {
            tracing::info!("Fetching audio for {} with {}", self.video_id, self.fetcher.tool_name());
            self.audio = match self
                .fetcher
                .download_audio(&self.video_id, &self.work_dir, &self.cancel)
                .await
            {
                Some(asset) => AudioSlot::Ready(asset),
                None => AudioSlot::Unavailable,
            };
        }

        match &self.audio {
            AudioSlot::Ready(asset) => Ok(asset.clone()),
            _ => Err(TranscriptorError::AudioExtractionFailed(
                "no usable audio could be downloaded".to_string(),
            )),
        }
    }
}

/// One transcription strategy in the fallback chain
#[async_trait]
pub trait TranscriptionLayer: Send + Sync {
    /// Source tag recorded when this layer succeeds
    fn source(&self) -> TranscriptSource;

    /// Whether the layer can run at all (credentials present, not switched off)
    fn is_enabled(&self) -> bool {
        true
    }

    /// Try the layer once. Cost of a returned output is charged by the caller;
    /// anything billed on a failing path must be charged to `ctx` here.
    async fn attempt(&self, ctx: &mut VideoContext) -> Result<LayerOutput, TranscriptorError>;
}

/// Free caption layer
pub struct CaptionLayer {
    extractor: Arc<CaptionExtractor>,
}

impl CaptionLayer {
    pub fn new(extractor: Arc<CaptionExtractor>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl TranscriptionLayer for CaptionLayer {
    fn source(&self) -> TranscriptSource {
        TranscriptSource::FreeCaptions
    }

    async fn attempt(&self, ctx: &mut VideoContext) -> Result<LayerOutput, TranscriptorError> {
        let captions = self.extractor.extract(ctx.video_id(), ctx.cancel()).await?;
        Ok(LayerOutput {
            text: captions.text,
            language: Some(captions.language),
            confidence: None,
            cost: 0.0,
        })
    }
}

/// Paid speech-to-text layer; chunks audio that exceeds the provider ceiling
pub struct PaidLayer {
    source: TranscriptSource,
    client: Option<Arc<dyn SpeechToText>>,
    chunker: Arc<ChunkingCoordinator>,
    retry: RetryPolicy,
}

impl PaidLayer {
    /// `client` is `None` when the service has no credentials; the layer then
    /// reports itself disabled.
    pub fn new(
        source: TranscriptSource,
        client: Option<Arc<dyn SpeechToText>>,
        chunker: Arc<ChunkingCoordinator>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            client,
            chunker,
            retry,
        }
    }
}

#[async_trait]
impl TranscriptionLayer for PaidLayer {
    fn source(&self) -> TranscriptSource {
        self.source
    }

    fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    async fn attempt(&self, ctx: &mut VideoContext) -> Result<LayerOutput, TranscriptorError> {
        let client = self
            .client
            .as_deref()
            .ok_or_else(|| TranscriptorError::NotConfigured(format!("{} has no credentials", self.source)))?;

        let audio = ctx.audio().await?;

        if audio.size_bytes > client.max_upload_bytes() {
            tracing::info!(
                "Audio for {} exceeds the {} upload ceiling, chunking",
                ctx.video_id(),
                client.name()
            );
            return self.chunker.transcribe_chunked(ctx, &audio, client, &self.retry).await;
        }

        let cost = estimate_cost(audio.size_bytes, client.rate_per_minute());
        let cancel = ctx.cancel().clone();
        let raw = match self
            .retry
            .run(&cancel, client.name(), || client.transcribe(&audio.path))
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                // the service processed the audio and billed it
                if matches!(e, TranscriptorError::Unusable(_)) {
                    ctx.charge(cost);
                }
                return Err(e);
            }
        };

        Ok(LayerOutput {
            text: raw.text,
            language: raw.language,
            confidence: raw.confidence,
            cost,
        })
    }
}
