use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

pub mod search;
pub mod youtube;

pub use search::YoutubeSearch;
pub use youtube::YoutubeAudioFetcher;

/// Lightweight metadata about a candidate video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRef {
    pub id: String,

    pub title: String,

    /// Channel or uploader name
    pub channel: String,

    /// Duration in seconds, when the platform reports one
    pub duration_secs: Option<u64>,

    pub view_count: Option<u64>,

    pub published: Option<NaiveDate>,
}

/// A downloaded audio file scoped to one video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAsset {
    pub video_id: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

impl AudioAsset {
    /// Stat `path` and wrap it; `None` when the file is missing.
    pub fn from_path(video_id: &str, path: &Path) -> Option<Self> {
        let metadata = std::fs::metadata(path).ok()?;
        if !metadata.is_file() {
            return None;
        }
        Some(Self {
            video_id: video_id.to_string(),
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
        })
    }
}

/// Source of audio for the paid layers
///
/// Returns `None` rather than an error when no usable audio can be produced, so
/// "no audio" is an ordinary branch for the caller.
#[async_trait]
pub trait AudioFetcher: Send + Sync {
    async fn download_audio(
        &self,
        video_id: &str,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Option<AudioAsset>;

    /// Name of the underlying tool, for diagnostics
    fn tool_name(&self) -> &str;
}

/// Watch page URL for a video id
pub fn watch_url(base_url: &str, video_id: &str) -> String {
    format!(
        "{}/watch?v={}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(video_id)
    )
}
