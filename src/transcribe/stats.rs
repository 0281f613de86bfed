use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{TranscriptResult, TranscriptSource};

/// Aggregate view of one batch, derived from the full result list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionStats {
    pub total: usize,
    pub successful: usize,
    pub by_source: BTreeMap<TranscriptSource, usize>,
    pub total_cost: f64,
    pub success_rate: f64,
    pub elapsed_secs: f64,
}

impl TranscriptionStats {
    pub fn from_results(results: &[TranscriptResult], elapsed: Duration) -> Self {
        let mut by_source: BTreeMap<TranscriptSource, usize> =
            TranscriptSource::ALL.iter().map(|s| (*s, 0)).collect();
        for result in results {
            *by_source.entry(result.source).or_insert(0) += 1;
        }

        let total = results.len();
        let successful = results.iter().filter(|r| r.is_success()).count();
        // fold from +0.0; an empty f64 sum is -0.0
        let total_cost = results
            .iter()
            .filter_map(|r| r.cost_estimate)
            .fold(0.0, |acc, cost| acc + cost);
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };

        Self {
            total,
            successful,
            by_source,
            total_cost,
            success_rate,
            elapsed_secs: elapsed.as_secs_f64(),
        }
    }

    pub fn count(&self, source: TranscriptSource) -> usize {
        self.by_source.get(&source).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::LayerOutput;

    fn ok(id: &str, source: TranscriptSource, cost: f64) -> TranscriptResult {
        TranscriptResult::success(
            id,
            source,
            LayerOutput {
                text: "text".to_string(),
                language: None,
                confidence: None,
                cost,
            },
        )
    }

    #[test]
    fn test_stats_from_results() {
        let results = vec![
            ok("a", TranscriptSource::FreeCaptions, 0.0),
            ok("b", TranscriptSource::PaidWhisper, 0.03),
            ok("c", TranscriptSource::PaidDeepgram, 0.01),
            TranscriptResult::failed("d", "all layers failed"),
        ];

        let stats = TranscriptionStats::from_results(&results, Duration::from_secs(2));

        assert_eq!(stats.total, 4);
        assert_eq!(stats.successful, 3);
        assert_eq!(stats.by_source.values().sum::<usize>(), stats.total);
        assert_eq!(stats.count(TranscriptSource::Failed), 1);
        assert!((stats.total_cost - 0.04).abs() < 1e-9);
        assert!((stats.success_rate - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_batch() {
        let stats = TranscriptionStats::from_results(&[], Duration::ZERO);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.success_rate, 0.0);
        assert_eq!(stats.by_source.len(), 4);
    }

    #[test]
    fn test_all_failed_batch_costs_positive_zero() {
        let results = vec![
            TranscriptResult::failed("a", "free-captions: no captions available"),
            TranscriptResult::failed("b", "free-captions: no captions available"),
        ];

        let stats = TranscriptionStats::from_results(&results, Duration::ZERO);

        assert_eq!(stats.total_cost, 0.0);
        assert!(stats.total_cost.is_sign_positive());
        assert_eq!(format!("{:.4}", stats.total_cost), "0.0000");
    }
}
