use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::layers::{LayerOutput, VideoContext};
use super::providers::{estimate_cost, SpeechToText};
use crate::config::Config;
use crate::extractors::youtube::remove_if_exists;
use crate::extractors::AudioAsset;
use crate::process::{CommandRunner, CommandSpec};
use crate::utils::{normalize_whitespace, sanitize_filename, RetryPolicy};
use crate::TranscriptorError;

/// Splits oversized audio into fixed-duration parts and transcribes them in order
pub struct ChunkingCoordinator {
    runner: Arc<dyn CommandRunner>,
    ffmpeg_path: String,
    chunk_seconds: u32,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ChunkingCoordinator {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            ffmpeg_path: config.audio.segmenter.clone(),
            chunk_seconds: config.audio.chunk_seconds,
            timeout: config.timeouts.segmentation(),
            max_output_bytes: config.timeouts.command_output_bytes,
        }
    }

    fn chunk_dir(work_dir: &Path, video_id: &str) -> PathBuf {
        work_dir.join(format!("{}_chunks", sanitize_filename(video_id)))
    }

    /// Segment `audio` without re-encoding and return the parts in playback order
    async fn split(
        &self,
        video_id: &str,
        audio: &AudioAsset,
        chunk_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<PathBuf>, TranscriptorError> {
        fs_err::create_dir_all(chunk_dir).map_err(|e| {
            TranscriptorError::ToolFailed(format!("cannot create chunk directory: {}", e))
        })?;

        let extension = audio
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp3")
            .to_string();
        let pattern = chunk_dir
            .join(format!("{}_chunk_%03d.{}", sanitize_filename(video_id), extension))
            .to_string_lossy()
            .into_owned();

        let spec = CommandSpec::new(&self.ffmpeg_path, self.timeout)
            .max_output(self.max_output_bytes)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(audio.path.to_string_lossy())
            .args(["-f", "segment", "-segment_time"])
            .arg(self.chunk_seconds.to_string())
            .args(["-c", "copy", "-reset_timestamps", "1"])
            .arg(pattern);

        let output = self.runner.run(&spec, cancel).await?;
        if !output.success {
            return Err(TranscriptorError::ToolFailed(format!(
                "{} segmentation failed: {}",
                self.ffmpeg_path,
                output.stderr_tail()
            )));
        }

        let mut chunks: Vec<PathBuf> = fs_err::read_dir(chunk_dir)
            .map_err(|e| TranscriptorError::ToolFailed(format!("cannot list chunks: {}", e)))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        chunks.sort();

        if chunks.is_empty() {
            return Err(TranscriptorError::ToolFailed(
                "segmentation produced zero parts".to_string(),
            ));
        }
        Ok(chunks)
    }

    /// Transcribe `audio` piecewise through `client`.
    ///
    /// Each chunk file is deleted right after its own attempt. Any failed chunk
    /// aborts the whole attempt; partial transcripts are never returned, but
    /// chunks already billed are charged to `ctx`.
    pub async fn transcribe_chunked(
        &self,
        ctx: &mut VideoContext,
        audio: &AudioAsset,
        client: &dyn SpeechToText,
        retry: &RetryPolicy,
    ) -> Result<LayerOutput, TranscriptorError> {
        let chunk_dir = Self::chunk_dir(ctx.work_dir(), ctx.video_id());
        let mut billed = 0.0;
        let result = self.transcribe_parts(ctx, audio, client, retry, &mut billed).await;

        // Sweep strays on every path
        if let Err(e) = std::fs::remove_dir_all(&chunk_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!("Could not remove {}: {}", chunk_dir.display(), e);
            }
        }

        if result.is_err() {
            ctx.charge(billed);
        }
        result
    }

    async fn transcribe_parts(
        &self,
        ctx: &VideoContext,
        audio: &AudioAsset,
        client: &dyn SpeechToText,
        retry: &RetryPolicy,
        billed: &mut f64,
    ) -> Result<LayerOutput, TranscriptorError> {
        let (video_id, cancel) = (ctx.video_id(), ctx.cancel());
        let chunk_dir = Self::chunk_dir(ctx.work_dir(), video_id);
        let chunks = self.split(video_id, audio, &chunk_dir, cancel).await?;
        let count = chunks.len();
        tracing::info!(
            "Split {} into {} chunks of {}s for {}",
            video_id,
            count,
            self.chunk_seconds,
            client.name()
        );

        let mut texts = Vec::with_capacity(count);
        let mut language = None;
        let mut confidences = Vec::new();

        for (index, chunk) in chunks.iter().enumerate() {
            let size = std::fs::metadata(chunk).map(|m| m.len()).unwrap_or(0);
            let attempt = retry
                .run(cancel, client.name(), || client.transcribe(chunk))
                .await;
            remove_if_exists(chunk);

            let chunk_cost = estimate_cost(size, client.rate_per_minute());
            if matches!(attempt, Ok(_) | Err(TranscriptorError::Unusable(_))) {
                *billed += chunk_cost;
            }

            let raw = attempt.map_err(|e| match e {
                TranscriptorError::Cancelled => TranscriptorError::Cancelled,
                other => TranscriptorError::TranscriptionFailed(format!(
                    "chunk {}/{} failed: {}",
                    index + 1,
                    count,
                    other
                )),
            })?;

            language = language.or(raw.language);
            confidences.extend(raw.confidence);
            texts.push(raw.text);
        }

        let confidence = if confidences.is_empty() {
            None
        } else {
            Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
        };

        Ok(LayerOutput {
            text: normalize_whitespace(&texts.join(" ")),
            language,
            confidence,
            cost: *billed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::AudioFetcher;
    use crate::process::{CommandOutput, MockCommandRunner};
    use crate::transcribe::providers::{MockSpeechToText, RawTranscript};
    use async_trait::async_trait;

    const VIDEO_ID: &str = "abcdefghijk";

    /// Audio is handed over directly in these tests
    struct NoFetch;

    #[async_trait]
    impl AudioFetcher for NoFetch {
        async fn download_audio(&self, _: &str, _: &Path, _: &CancellationToken) -> Option<AudioAsset> {
            None
        }

        fn tool_name(&self) -> &str {
            "none"
        }
    }

    fn context(dir: &Path) -> VideoContext {
        VideoContext::new(VIDEO_ID, dir, Arc::new(NoFetch), CancellationToken::new())
    }

    /// Pretends to be ffmpeg: writes `parts` chunk files at the output pattern
    fn segmenter(parts: usize) -> MockCommandRunner {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(move |spec, _| {
            let pattern = spec.args.last().unwrap().clone();
            for i in 0..parts {
                let path = pattern.replace("%03d", &format!("{:03}", i));
                fs_err::write(path, vec![0u8; 1000]).unwrap();
            }
            Ok(CommandOutput {
                success: true,
                code: Some(0),
                ..Default::default()
            })
        });
        runner
    }

    fn asset(dir: &Path) -> AudioAsset {
        let path = dir.join(format!("{}.mp3", VIDEO_ID));
        fs_err::write(&path, vec![0u8; 3000]).unwrap();
        AudioAsset::from_path(VIDEO_ID, &path).unwrap()
    }

    fn client_returning(texts: Vec<&'static str>) -> MockSpeechToText {
        let mut client = MockSpeechToText::new();
        client.expect_name().return_const("whisper");
        client.expect_rate_per_minute().return_const(0.006);
        let mut remaining = texts.into_iter();
        client.expect_transcribe().returning(move |path| {
            assert!(path.exists(), "chunk should exist while transcribing");
            match remaining.next() {
                Some("FAIL") | None => Err(TranscriptorError::TranscriptionFailed("boom".into())),
                Some(text) => Ok(RawTranscript {
                    text: text.to_string(),
                    language: Some("en".to_string()),
                    confidence: Some(0.8),
                }),
            }
        });
        client
    }

    fn chunk_files_left(dir: &Path) -> usize {
        walk(dir).iter().filter(|p| p.to_string_lossy().contains("_chunk_")).count()
    }

    fn walk(dir: &Path) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(walk(&path));
            }
            out.push(path);
        }
        out
    }

    #[tokio::test]
    async fn test_concatenates_chunks_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ChunkingCoordinator::new(Arc::new(segmenter(3)), &Config::default());
        let client = client_returning(vec![" first  part ", "second\npart", "third part"]);
        let mut ctx = context(dir.path());

        let output = coordinator
            .transcribe_chunked(&mut ctx, &asset(dir.path()), &client, &RetryPolicy::none())
            .await
            .unwrap();

        assert_eq!(output.text, "first part second part third part");
        assert!((output.cost - 3.0 * estimate_cost(1000, 0.006)).abs() < 1e-12);
        // a kept output is charged by the orchestrator, not here
        assert_eq!(ctx.spent(), 0.0);
        assert_eq!(output.language.as_deref(), Some("en"));
        assert_eq!(chunk_files_left(dir.path()), 0);
        assert!(!ChunkingCoordinator::chunk_dir(dir.path(), VIDEO_ID).exists());
    }

    #[tokio::test]
    async fn test_failed_chunk_aborts_and_sweeps() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ChunkingCoordinator::new(Arc::new(segmenter(3)), &Config::default());
        let client = client_returning(vec!["first part", "FAIL"]);
        let mut ctx = context(dir.path());

        let err = coordinator
            .transcribe_chunked(&mut ctx, &asset(dir.path()), &client, &RetryPolicy::none())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("chunk 2/3"));
        assert_eq!(chunk_files_left(dir.path()), 0);
        // the first chunk was transcribed and billed before the abort
        assert!((ctx.spent() - estimate_cost(1000, 0.006)).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_zero_parts_is_resource_failure() {
        let dir = tempfile::tempdir().unwrap();
        let coordinator = ChunkingCoordinator::new(Arc::new(segmenter(0)), &Config::default());
        let mut client = MockSpeechToText::new();
        client.expect_name().return_const("whisper");
        client.expect_transcribe().never();
        let mut ctx = context(dir.path());

        let err = coordinator
            .transcribe_chunked(&mut ctx, &asset(dir.path()), &client, &RetryPolicy::none())
            .await
            .unwrap_err();

        assert!(matches!(err, TranscriptorError::ToolFailed(_)));
        assert_eq!(ctx.spent(), 0.0);
    }
}
