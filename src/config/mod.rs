use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const WHISPER_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEEPGRAM_KEY_ENV: &str = "DEEPGRAM_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Free caption layer settings
    pub captions: CaptionsConfig,

    /// Paid layer A: OpenAI Whisper
    pub whisper: ServiceConfig,

    /// Paid layer B: Deepgram
    pub deepgram: ServiceConfig,

    /// External audio tooling
    pub audio: AudioConfig,

    /// Batch scheduling and discovery
    pub batch: BatchConfig,

    /// Per-call ceilings
    pub timeouts: TimeoutConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionsConfig {
    /// Video platform origin (watch page and player endpoint)
    pub base_url: String,

    /// Preferred caption languages, most preferred first
    pub languages: Vec<String>,

    /// Transcripts shorter than this are treated as unusable by every layer
    pub min_transcript_chars: usize,

    /// Attempts for page fetch + player call
    pub retry_attempts: u32,

    /// First backoff delay; doubles per attempt
    pub retry_base_delay_ms: u64,

    /// Innertube client identity sent to the player endpoint
    pub client_name: String,
    pub client_version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// API key (environment variable wins when set)
    #[serde(default)]
    pub api_key: Option<String>,

    pub base_url: String,

    pub model: String,

    /// Price in currency units per audio minute
    pub rate_per_minute: f64,

    /// Largest upload the service accepts before chunking kicks in
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Downloader executable (yt-dlp)
    pub downloader: String,

    /// Segmentation executable (ffmpeg)
    pub segmenter: String,

    /// Downloads below this size are suspected to be silent or music-only
    pub suspicious_size_bytes: u64,

    /// Passed to the downloader as its max file size
    pub max_download_size: String,

    /// Duration of each chunk when audio exceeds a provider ceiling
    pub chunk_seconds: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub concurrency: usize,

    /// Pause between groups
    pub pacing_delay_ms: u64,

    pub max_videos: usize,

    pub results_per_query: usize,

    /// Discovered videos longer than this are dropped
    pub max_duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub page_secs: u64,
    pub player_secs: u64,
    pub caption_payload_secs: u64,
    pub download_secs: u64,
    pub transcription_secs: u64,
    pub segmentation_secs: u64,
    pub search_secs: u64,

    /// Cap on captured stdout/stderr of external commands
    pub command_output_bytes: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for per-video working directories
    pub temp_dir: Option<PathBuf>,
}

impl Default for CaptionsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.youtube.com".to_string(),
            languages: vec!["en".to_string(), "en-US".to_string(), "en-IN".to_string(), "hi".to_string()],
            min_transcript_chars: 100,
            retry_attempts: 3,
            retry_base_delay_ms: 1000,
            client_name: "WEB".to_string(),
            client_version: "2.20240726.00.00".to_string(),
        }
    }
}

impl ServiceConfig {
    pub fn whisper() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            model: "whisper-1".to_string(),
            rate_per_minute: 0.006,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }

    pub fn deepgram() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.deepgram.com".to_string(),
            model: "nova-2".to_string(),
            rate_per_minute: 0.0043,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }

    /// A blank key counts as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }

    pub fn is_configured(&self) -> bool {
        self.api_key().is_some()
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            downloader: "yt-dlp".to_string(),
            segmenter: "ffmpeg".to_string(),
            suspicious_size_bytes: 10 * 1024,
            max_download_size: "200M".to_string(),
            chunk_seconds: 600,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            pacing_delay_ms: 1000,
            max_videos: 10,
            results_per_query: 5,
            max_duration_secs: 1200,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            page_secs: 15,
            player_secs: 15,
            caption_payload_secs: 15,
            download_secs: 300,
            transcription_secs: 300,
            segmentation_secs: 120,
            search_secs: 60,
            command_output_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            captions: CaptionsConfig::default(),
            whisper: ServiceConfig::whisper(),
            deepgram: ServiceConfig::deepgram(),
            audio: AudioConfig::default(),
            batch: BatchConfig::default(),
            timeouts: TimeoutConfig::default(),
            app: AppConfig::default(),
        }
    }
}

impl TimeoutConfig {
    pub fn page(&self) -> Duration {
        Duration::from_secs(self.page_secs)
    }

    pub fn player(&self) -> Duration {
        Duration::from_secs(self.player_secs)
    }

    pub fn caption_payload(&self) -> Duration {
        Duration::from_secs(self.caption_payload_secs)
    }

    pub fn download(&self) -> Duration {
        Duration::from_secs(self.download_secs)
    }

    pub fn transcription(&self) -> Duration {
        Duration::from_secs(self.transcription_secs)
    }

    pub fn segmentation(&self) -> Duration {
        Duration::from_secs(self.segmentation_secs)
    }

    pub fn search(&self) -> Duration {
        Duration::from_secs(self.search_secs)
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str::<Config>(&content)
                .context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.save_to(&config_path).await?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("clipscribe.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("clipscribe").join("config.yaml"))
    }

    /// Credentials from the environment take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(WHISPER_KEY_ENV) {
            if !key.trim().is_empty() {
                self.whisper.api_key = Some(key);
            }
        }
        if let Ok(key) = std::env::var(DEEPGRAM_KEY_ENV) {
            if !key.trim().is_empty() {
                self.deepgram.api_key = Some(key);
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch.concurrency == 0 {
            anyhow::bail!("batch.concurrency must be at least 1");
        }
        if self.audio.chunk_seconds == 0 {
            anyhow::bail!("audio.chunk_seconds must be greater than zero");
        }
        if self.captions.retry_attempts == 0 {
            anyhow::bail!("captions.retry_attempts must be at least 1");
        }
        if self.captions.languages.is_empty() {
            anyhow::bail!("captions.languages must list at least one language");
        }
        for (name, service) in [("whisper", &self.whisper), ("deepgram", &self.deepgram)] {
            url::Url::parse(&service.base_url)
                .with_context(|| format!("{}.base_url is not a valid URL", name))?;
        }
        url::Url::parse(&self.captions.base_url)
            .context("captions.base_url is not a valid URL")?;

        Ok(())
    }

    /// Root directory under which each video gets its own working directory
    pub fn work_root(&self) -> PathBuf {
        self.app
            .temp_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("clipscribe"))
    }

    /// Display current configuration
    pub fn display(&self) {
        let key_state = |service: &ServiceConfig| {
            if service.is_configured() { "set" } else { "missing" }
        };

        println!("Current Configuration:");
        println!("  Caption languages: {}", self.captions.languages.join(", "));
        println!("  Minimum transcript length: {} chars", self.captions.min_transcript_chars);
        println!("  Whisper: model {} (key {})", self.whisper.model, key_state(&self.whisper));
        println!("  Deepgram: model {} (key {})", self.deepgram.model, key_state(&self.deepgram));
        println!("  Downloader: {}", self.audio.downloader);
        println!("  Segmenter: {}", self.audio.segmenter);
        println!("  Concurrency: {}", self.batch.concurrency);
        println!("  Work directory: {}", self.work_root().display());
    }
}
