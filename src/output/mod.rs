use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::transcribe::{BatchReport, TranscriptSource};
use crate::utils::format_duration;

/// Render a report as plain text: one block per video, then a summary
pub fn format_as_text(report: &BatchReport) -> String {
    let mut out = String::new();

    for result in &report.results {
        let _ = writeln!(out, "=== {} [{}] ===", result.video_id, result.source);
        match (&result.transcript, &result.error) {
            (Some(text), _) => {
                if let Some(language) = &result.language {
                    let _ = writeln!(out, "Language: {}", language);
                }
                if let Some(cost) = result.cost_estimate.filter(|c| *c > 0.0) {
                    let _ = writeln!(out, "Estimated cost: ${:.4}", cost);
                }
                let _ = writeln!(out, "{}", text);
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "Failed: {}", error);
                if let Some(cost) = result.cost_estimate.filter(|c| *c > 0.0) {
                    let _ = writeln!(out, "Spent before failing: ${:.4}", cost);
                }
            }
            (None, None) => {
                let _ = writeln!(out, "Failed");
            }
        }
        out.push('\n');
    }

    let stats = &report.stats;
    let _ = writeln!(
        out,
        "Summary: {}/{} transcribed ({:.0}%) in {}",
        stats.successful,
        stats.total,
        stats.success_rate * 100.0,
        format_duration(stats.elapsed_secs)
    );
    let breakdown: Vec<String> = TranscriptSource::ALL
        .iter()
        .map(|source| format!("{}: {}", source, stats.count(*source)))
        .collect();
    let _ = writeln!(out, "By source: {}", breakdown.join(", "));
    let _ = write!(out, "Estimated cost: ${:.4}", stats.total_cost);

    out
}

pub fn format_as_json(report: &BatchReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("Failed to serialize report")
}

fn render(report: &BatchReport, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format_as_text(report)),
        OutputFormat::Json => format_as_json(report),
    }
}

/// Save a batch report to file
pub async fn save_to_file(report: &BatchReport, path: &Path, format: &OutputFormat) -> Result<()> {
    let content = render(report, format)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs_err::create_dir_all(parent)?;
        }
    }
    fs_err::write(path, content)?;
    Ok(())
}

/// Print a batch report to the console
pub fn print_to_console(report: &BatchReport, format: &OutputFormat) -> Result<()> {
    let content = render(report, format)?;
    println!("{}", content);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcribe::{LayerOutput, TranscriptResult};
    use std::time::Duration;

    fn report() -> BatchReport {
        BatchReport::new(
            vec![
                TranscriptResult::success(
                    "aaaaaaaaaaa",
                    TranscriptSource::PaidDeepgram,
                    LayerOutput {
                        text: "engine feels refined".to_string(),
                        language: Some("en".to_string()),
                        confidence: Some(0.9),
                        cost: 0.0125,
                    },
                ),
                TranscriptResult::failed("bbbbbbbbbbb", "free-captions: no captions available"),
                TranscriptResult::failed("ccccccccccc", "paid-whisper: transcript too short (48 chars)")
                    .with_cost(0.0075),
            ],
            Duration::from_secs(3),
        )
    }

    #[test]
    fn test_text_lists_each_video_and_summary() {
        let text = format_as_text(&report());

        assert!(text.contains("=== aaaaaaaaaaa [paid-deepgram] ==="));
        assert!(text.contains("engine feels refined"));
        assert!(text.contains("Failed: free-captions: no captions available"));
        assert!(text.contains("Summary: 1/3 transcribed (33%)"));
        assert!(text.contains("free-captions: 0, paid-whisper: 0, paid-deepgram: 1, failed: 2"));
        assert!(text.contains("Spent before failing: $0.0075"));
        assert!(text.ends_with("Estimated cost: $0.0200"));
    }

    #[test]
    fn test_json_uses_source_tags() {
        let json = format_as_json(&report()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["results"][0]["source"], "paid-deepgram");
        assert!(value["results"][1]["transcript"].is_null());
        assert_eq!(value["stats"]["by_source"]["failed"], 2);
    }

    #[tokio::test]
    async fn test_save_to_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("report.json");

        save_to_file(&report(), &path, &OutputFormat::Json).await.unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert!(saved.contains("\"run_id\""));
    }
}
