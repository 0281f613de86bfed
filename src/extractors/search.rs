use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::VideoRef;
use crate::config::Config;
use crate::process::{CommandRunner, CommandSpec};
use crate::TranscriptorError;

/// One line of `yt-dlp --dump-json --flat-playlist` output
#[derive(Debug, Deserialize)]
struct SearchRecord {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    view_count: Option<u64>,
    #[serde(default)]
    upload_date: Option<String>,
}

impl From<SearchRecord> for VideoRef {
    fn from(record: SearchRecord) -> Self {
        VideoRef {
            id: record.id,
            title: record.title.unwrap_or_default(),
            channel: record.channel.or(record.uploader).unwrap_or_default(),
            duration_secs: record.duration.filter(|d| *d >= 0.0).map(|d| d.round() as u64),
            view_count: record.view_count,
            published: record
                .upload_date
                .as_deref()
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok()),
        }
    }
}

/// Parse newline-delimited JSON records; malformed lines are skipped
pub fn parse_search_output(stdout: &str) -> Vec<VideoRef> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<SearchRecord>(line) {
            Ok(record) => Some(VideoRef::from(record)),
            Err(e) => {
                tracing::debug!("Skipping unparseable search record: {}", e);
                None
            }
        })
        .collect()
}

/// Comparison-style queries for a pair of topics
pub fn comparison_queries(topic_a: &str, topic_b: &str) -> Vec<String> {
    let (a, b) = (topic_a.trim(), topic_b.trim());
    vec![
        format!("{} vs {}", a, b),
        format!("{} vs {} comparison", a, b),
        format!("{} review", a),
        format!("{} review", b),
    ]
}

/// Merge per-query results: first occurrence wins, overly long videos are dropped,
/// and at most `max_videos` survive. Unknown durations are kept.
pub fn dedupe_and_filter(
    batches: Vec<Vec<VideoRef>>,
    max_duration_secs: u64,
    max_videos: usize,
) -> Vec<VideoRef> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|video| video.duration_secs.map_or(true, |d| d <= max_duration_secs))
        .filter(|video| seen.insert(video.id.clone()))
        .take(max_videos)
        .collect()
}

/// Video search through yt-dlp's search extractor
pub struct YoutubeSearch {
    runner: Arc<dyn CommandRunner>,
    yt_dlp_path: String,
    timeout: Duration,
    max_output_bytes: usize,
}

impl YoutubeSearch {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            yt_dlp_path: config.audio.downloader.clone(),
            timeout: config.timeouts.search(),
            max_output_bytes: config.timeouts.command_output_bytes,
        }
    }

    /// Search for up to `max_results` videos matching `query`
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<VideoRef>, TranscriptorError> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        tracing::info!("Searching videos for: {}", query);

        let spec = CommandSpec::new(&self.yt_dlp_path, self.timeout)
            .max_output(self.max_output_bytes)
            .args(["--dump-json", "--flat-playlist", "--no-warnings", "--ignore-errors"])
            .arg(format!("ytsearch{}:{}", max_results, query));

        let output = self.runner.run(&spec, cancel).await?;

        if !output.success && output.stdout.trim().is_empty() {
            return Err(TranscriptorError::ToolFailed(format!(
                "search failed: {}",
                output.stderr_tail()
            )));
        }

        let videos = parse_search_output(&output.stdout);
        tracing::debug!("Query {:?} returned {} videos", query, videos.len());
        Ok(videos)
    }

    /// Run several queries and merge them into a deduplicated candidate list.
    /// A failing query is logged and skipped.
    pub async fn discover(
        &self,
        queries: &[String],
        per_query: usize,
        max_duration_secs: u64,
        max_videos: usize,
        cancel: &CancellationToken,
    ) -> Vec<VideoRef> {
        let mut batches = Vec::with_capacity(queries.len());
        for query in queries {
            match self.search(query, per_query, cancel).await {
                Ok(videos) => batches.push(videos),
                Err(TranscriptorError::Cancelled) => break,
                Err(e) => tracing::warn!("Search for {:?} failed: {}", query, e),
            }
        }

        let videos = dedupe_and_filter(batches, max_duration_secs, max_videos);
        tracing::info!("Discovered {} unique videos from {} queries", videos.len(), queries.len());
        videos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, MockCommandRunner};

    fn video(id: &str, duration: Option<u64>) -> VideoRef {
        VideoRef {
            id: id.to_string(),
            title: format!("title {}", id),
            channel: "chan".to_string(),
            duration_secs: duration,
            view_count: None,
            published: None,
        }
    }

    #[test]
    fn test_parse_search_output() {
        let stdout = concat!(
            r#"{"id":"aaaaaaaaaaa","title":"Bike A vs Bike B","channel":"Moto","duration":312.0,"view_count":1500,"upload_date":"20240115"}"#,
            "\n",
            "not json\n",
            r#"{"id":"bbbbbbbbbbb","title":"Short","uploader":"Someone"}"#,
            "\n"
        );

        let videos = parse_search_output(stdout);

        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].duration_secs, Some(312));
        assert_eq!(videos[0].published, NaiveDate::from_ymd_opt(2024, 1, 15));
        assert_eq!(videos[1].channel, "Someone");
        assert_eq!(videos[1].duration_secs, None);
    }

    #[test]
    fn test_comparison_queries() {
        let queries = comparison_queries(" Duke 390 ", "RC 390");
        assert_eq!(queries[0], "Duke 390 vs RC 390");
        assert_eq!(queries.len(), 4);
        assert!(queries.contains(&"RC 390 review".to_string()));
    }

    #[test]
    fn test_dedupe_and_filter() {
        let batches = vec![
            vec![video("a", Some(100)), video("b", Some(5000))],
            vec![video("a", Some(100)), video("c", None), video("d", Some(60))],
        ];

        let videos = dedupe_and_filter(batches, 1200, 10);
        let ids: Vec<_> = videos.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c", "d"]);

        let capped = dedupe_and_filter(vec![vec![video("a", None), video("b", None)]], 1200, 1);
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn test_search_invokes_ytsearch() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|spec, _| spec.args.last().map(String::as_str) == Some("ytsearch3:duke review"))
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    stdout: r#"{"id":"aaaaaaaaaaa","title":"t","channel":"c","duration":60}"#.to_string(),
                    stderr: String::new(),
                })
            });

        let search = YoutubeSearch::new(Arc::new(runner), &Config::default());
        let videos = search
            .search("duke review", 3, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].id, "aaaaaaaaaaa");
    }

    #[tokio::test]
    async fn test_discover_skips_failing_queries() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(2).returning(|spec, _| {
            if spec.args.last().unwrap().contains("broken") {
                Ok(CommandOutput {
                    success: false,
                    code: Some(1),
                    stderr: "ERROR: boom".to_string(),
                    ..Default::default()
                })
            } else {
                Ok(CommandOutput {
                    success: true,
                    code: Some(0),
                    stdout: r#"{"id":"aaaaaaaaaaa","duration":60}"#.to_string(),
                    stderr: String::new(),
                })
            }
        });

        let search = YoutubeSearch::new(Arc::new(runner), &Config::default());
        let queries = vec!["broken".to_string(), "fine".to_string()];
        let videos = search
            .discover(&queries, 5, 1200, 10, &CancellationToken::new())
            .await;

        assert_eq!(videos.len(), 1);
    }
}
