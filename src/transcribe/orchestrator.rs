use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use super::batch::VideoTranscriber;
use super::layers::{TranscriptionLayer, VideoContext};
use super::TranscriptResult;
use crate::extractors::AudioFetcher;
use crate::utils::sanitize_filename;
use crate::TranscriptorError;

/// Per-video state machine: tries each layer in order and stops at the first
/// transcript long enough to use.
///
/// All files for a video live in a private working directory named after the
/// video id. The directory is a [`TempDir`], so it is removed when the run ends
/// however it ends: success, exhausted layers, cancellation, or unwinding.
pub struct Orchestrator {
    layers: Vec<Arc<dyn TranscriptionLayer>>,
    fetcher: Arc<dyn AudioFetcher>,
    work_root: PathBuf,
    min_chars: usize,
}

impl Orchestrator {
    pub fn new(
        layers: Vec<Arc<dyn TranscriptionLayer>>,
        fetcher: Arc<dyn AudioFetcher>,
        work_root: &Path,
        min_chars: usize,
    ) -> Self {
        Self {
            layers,
            fetcher,
            work_root: work_root.to_path_buf(),
            min_chars,
        }
    }

    pub fn layers(&self) -> &[Arc<dyn TranscriptionLayer>] {
        &self.layers
    }

    fn create_work_dir(&self, video_id: &str) -> std::io::Result<TempDir> {
        fs_err::create_dir_all(&self.work_root)?;
        tempfile::Builder::new()
            .prefix(&format!("{}_", sanitize_filename(video_id)))
            .tempdir_in(&self.work_root)
    }

    /// Produce exactly one result for `video_id`
    pub async fn transcribe_video(&self, video_id: &str, cancel: &CancellationToken) -> TranscriptResult {
        let work_dir = match self.create_work_dir(video_id) {
            Ok(dir) => dir,
            Err(e) => {
                return TranscriptResult::failed(video_id, format!("cannot create work directory: {}", e));
            }
        };

        let result = self.run_layers(video_id, work_dir.path(), cancel).await;

        let path = work_dir.path().to_path_buf();
        if let Err(e) = work_dir.close() {
            tracing::debug!("Cleanup of {} failed: {}", path.display(), e);
        }

        result
    }

    async fn run_layers(&self, video_id: &str, work_dir: &Path, cancel: &CancellationToken) -> TranscriptResult {
        let mut ctx = VideoContext::new(video_id, work_dir, self.fetcher.clone(), cancel.clone());
        let mut failures: Vec<String> = Vec::new();

        for layer in &self.layers {
            let source = layer.source();

            if cancel.is_cancelled() {
                failures.push(TranscriptorError::Cancelled.to_string());
                break;
            }

            if !layer.is_enabled() {
                tracing::debug!("Skipping {} for {}: not configured", source, video_id);
                failures.push(format!("{}: skipped (not configured)", source));
                continue;
            }

            tracing::info!("Trying {} for {}", source, video_id);

            let outcome = tokio::select! {
                outcome = layer.attempt(&mut ctx) => outcome,
                _ = cancel.cancelled() => Err(TranscriptorError::Cancelled),
            };

            match outcome {
                Ok(output) => {
                    ctx.charge(output.cost);
                    let length = output.text.chars().count();
                    if length >= self.min_chars {
                        tracing::info!("{} succeeded for {} ({} chars)", source, video_id, length);
                        return TranscriptResult::success(video_id, source, output).with_cost(ctx.spent());
                    }
                    tracing::info!("{} for {} too short ({} chars), falling through", source, video_id, length);
                    failures.push(format!("{}: transcript too short ({} chars)", source, length));
                }
                Err(TranscriptorError::Cancelled) => {
                    failures.push(format!("{}: {}", source, TranscriptorError::Cancelled));
                    break;
                }
                Err(e) => {
                    tracing::info!("{} failed for {}: {}", source, video_id, e);
                    failures.push(format!("{}: {}", source, e));
                }
            }
        }

        if failures.is_empty() {
            failures.push("no transcription layers available".to_string());
        }
        tracing::warn!("All layers failed for {}", video_id);
        let result = TranscriptResult::failed(video_id, failures.join("; "));
        if ctx.spent() > 0.0 {
            result.with_cost(ctx.spent())
        } else {
            result
        }
    }
}

#[async_trait]
impl VideoTranscriber for Orchestrator {
    async fn transcribe(&self, video_id: &str, cancel: &CancellationToken) -> TranscriptResult {
        self.transcribe_video(video_id, cancel).await
    }
}
