use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{watch_url, AudioAsset, AudioFetcher};
use crate::config::Config;
use crate::process::{CommandRunner, CommandSpec};
use crate::utils::{format_file_size, sanitize_filename};
use crate::TranscriptorError;

/// Two invocation profiles: the normal one, and a fallback that asks for a
/// different player client and container when the first result looks wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Profile {
    Primary,
    Alternate,
}

impl Profile {
    fn file_stem(&self, video_id: &str) -> String {
        let id = sanitize_filename(video_id);
        match self {
            Profile::Primary => id,
            Profile::Alternate => format!("{}_alt", id),
        }
    }

    fn format_args(&self) -> Vec<&'static str> {
        match self {
            // 128K keeps file size in line with ASSUMED_BYTES_PER_MINUTE
            Profile::Primary => vec!["--format", "bestaudio/best", "--audio-quality", "128K"],
            Profile::Alternate => vec![
                "--format",
                "bestaudio[ext=m4a]/bestaudio/best",
                "--extractor-args",
                "youtube:player_client=android,web",
                "--audio-quality",
                "5",
            ],
        }
    }
}

/// Downloads best-available audio with yt-dlp
pub struct YoutubeAudioFetcher {
    runner: Arc<dyn CommandRunner>,
    yt_dlp_path: String,
    base_url: String,
    suspicious_size_bytes: u64,
    max_download_size: String,
    timeout: Duration,
    max_output_bytes: usize,
}

impl YoutubeAudioFetcher {
    pub fn new(runner: Arc<dyn CommandRunner>, config: &Config) -> Self {
        Self {
            runner,
            yt_dlp_path: config.audio.downloader.clone(),
            base_url: config.captions.base_url.clone(),
            suspicious_size_bytes: config.audio.suspicious_size_bytes,
            max_download_size: config.audio.max_download_size.clone(),
            timeout: config.timeouts.download(),
            max_output_bytes: config.timeouts.command_output_bytes,
        }
    }

    /// Path the given profile writes to
    fn target_path(&self, work_dir: &Path, video_id: &str, profile: Profile) -> PathBuf {
        work_dir.join(format!("{}.mp3", profile.file_stem(video_id)))
    }

    fn command(&self, work_dir: &Path, video_id: &str, profile: Profile) -> CommandSpec {
        let template = work_dir
            .join(format!("{}.%(ext)s", profile.file_stem(video_id)))
            .to_string_lossy()
            .into_owned();

        CommandSpec::new(&self.yt_dlp_path, self.timeout)
            .max_output(self.max_output_bytes)
            .args(profile.format_args())
            .args([
                // Audio only, fixed container/codec
                "--extract-audio",
                "--audio-format",
                "mp3",
                "--no-playlist",
                "--no-warnings",
                "--force-overwrites",
                "--max-filesize",
                self.max_download_size.as_str(),
                "--output",
                template.as_str(),
            ])
            .arg(watch_url(&self.base_url, video_id))
    }

    /// One download attempt with one profile
    async fn try_profile(
        &self,
        video_id: &str,
        work_dir: &Path,
        profile: Profile,
        cancel: &CancellationToken,
    ) -> Result<AudioAsset, TranscriptorError> {
        let target = self.target_path(work_dir, video_id, profile);
        remove_if_exists(&target);

        let output = self
            .runner
            .run(&self.command(work_dir, video_id, profile), cancel)
            .await?;

        if !output.success {
            return Err(TranscriptorError::AudioExtractionFailed(format!(
                "{} exited with {:?}: {}",
                self.yt_dlp_path,
                output.code,
                output.stderr_tail()
            )));
        }

        let asset = AudioAsset::from_path(video_id, &target).ok_or_else(|| {
            TranscriptorError::AudioExtractionFailed("download produced no file".to_string())
        })?;

        if asset.size_bytes < self.suspicious_size_bytes {
            return Err(TranscriptorError::Unusable(format!(
                "audio is only {} (likely silent or music-only)",
                format_file_size(asset.size_bytes)
            )));
        }

        Ok(asset)
    }
}

#[async_trait]
impl AudioFetcher for YoutubeAudioFetcher {
    async fn download_audio(
        &self,
        video_id: &str,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Option<AudioAsset> {
        for profile in [Profile::Primary, Profile::Alternate] {
            match self.try_profile(video_id, work_dir, profile, cancel).await {
                Ok(asset) => {
                    tracing::info!(
                        "Downloaded audio for {} ({}, {:?} profile)",
                        video_id,
                        format_file_size(asset.size_bytes),
                        profile
                    );
                    return Some(asset);
                }
                Err(e @ (TranscriptorError::Cancelled | TranscriptorError::NotConfigured(_))) => {
                    tracing::warn!("Audio download for {} aborted: {}", video_id, e);
                    return None;
                }
                Err(e) => {
                    tracing::warn!("Audio download for {} ({:?} profile) failed: {}", video_id, profile, e);
                }
            }
        }

        None
    }

    fn tool_name(&self) -> &str {
        &self.yt_dlp_path
    }
}

/// Best-effort delete; a missing file is fine
pub(crate) fn remove_if_exists(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::debug!("Could not remove {}: {}", path.display(), e),
    }
}
