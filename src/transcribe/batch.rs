use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::{TranscriptResult, TranscriptionStats};
use crate::TranscriptorError;

/// Anything that turns one video id into one result
#[async_trait]
pub trait VideoTranscriber: Send + Sync {
    async fn transcribe(&self, video_id: &str, cancel: &CancellationToken) -> TranscriptResult;
}

/// Outcome of one batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: Uuid,
    pub results: Vec<TranscriptResult>,
    pub stats: TranscriptionStats,
    pub completed_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn new(results: Vec<TranscriptResult>, elapsed: Duration) -> Self {
        let stats = TranscriptionStats::from_results(&results, elapsed);
        Self {
            run_id: Uuid::new_v4(),
            results,
            stats,
            completed_at: Utc::now(),
        }
    }
}

/// Runs videos in fixed-size groups with a pacing delay between groups
pub struct BatchScheduler {
    transcriber: Arc<dyn VideoTranscriber>,
    pacing: Duration,
    progress: Option<ProgressBar>,
}

impl BatchScheduler {
    pub fn new(transcriber: Arc<dyn VideoTranscriber>, pacing: Duration) -> Self {
        Self {
            transcriber,
            pacing,
            progress: None,
        }
    }

    /// Tick `progress` once per finished video
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Transcribe every id, returning results in input order.
    ///
    /// At most `concurrency` videos are in flight at once. Ids never started
    /// because of cancellation still get a `failed` result.
    pub async fn transcribe_batch(
        &self,
        video_ids: &[String],
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> BatchReport {
        let start = Instant::now();
        let group_size = concurrency.max(1);
        let group_count = video_ids.len().div_ceil(group_size);
        let mut results = Vec::with_capacity(video_ids.len());

        if let Some(pb) = &self.progress {
            pb.set_length(video_ids.len() as u64);
        }

        for (index, group) in video_ids.chunks(group_size).enumerate() {
            if cancel.is_cancelled() {
                results.extend(
                    group
                        .iter()
                        .map(|id| TranscriptResult::failed(id, TranscriptorError::Cancelled.to_string())),
                );
                continue;
            }

            tracing::info!("Processing group {}/{} ({} videos)", index + 1, group_count, group.len());

            let handles: Vec<_> = group
                .iter()
                .map(|id| {
                    let transcriber = self.transcriber.clone();
                    let cancel = cancel.clone();
                    let id = id.clone();
                    tokio::spawn(async move { transcriber.transcribe(&id, &cancel).await })
                })
                .collect();

            // join_all yields outputs in spawn order, i.e. input order
            let outcomes = join_all(handles).await;
            for (id, outcome) in group.iter().zip(outcomes) {
                let result = match outcome {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::error!("Task for {} aborted: {}", id, e);
                        TranscriptResult::failed(id, format!("task aborted: {}", e))
                    }
                };
                if let Some(pb) = &self.progress {
                    pb.set_message(format!("{} -> {}", id, result.source));
                    pb.inc(1);
                }
                results.push(result);
            }

            if index + 1 < group_count && !self.pacing.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.pacing) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }

        if let Some(pb) = &self.progress {
            pb.finish_and_clear();
        }

        let report = BatchReport::new(results, start.elapsed());
        tracing::info!(
            "Batch {} finished: {}/{} successful, estimated cost ${:.4}",
            report.run_id,
            report.stats.successful,
            report.stats.total,
            report.stats.total_cost
        );
        report
    }
}
