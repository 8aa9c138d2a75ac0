use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Browser identity presented to the upstream site
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,

    /// yt-dlp settings
    pub fetcher: FetcherConfig,

    /// ffmpeg settings
    pub transcoder: TranscoderConfig,

    /// Screenshot and thumbnail settings
    pub auxiliary: AuxiliaryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Parent directory for per-job workspaces (system temp dir if unset)
    pub work_dir: Option<PathBuf>,

    /// Directory that finished outputs are persisted into
    pub output_dir: PathBuf,

    /// Cadence of progress stream updates in milliseconds
    pub progress_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub yt_dlp_path: String,

    /// yt-dlp format selector
    pub format_selector: String,

    /// Retry count for downloads, fragments and extractor calls
    pub retries: u32,

    pub socket_timeout_secs: u64,

    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscoderConfig {
    pub ffmpeg_path: String,

    /// Apply loudness normalization and light compression to the segment
    pub loudness_filter: bool,

    /// Bitrate passed to the mp3 encoder
    pub mp3_bitrate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuxiliaryConfig {
    /// Capture a frame at the segment start
    pub screenshot: bool,

    pub screenshot_width: u32,

    pub screenshot_height: u32,

    pub thumbnail_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            output_dir: PathBuf::from("clipforge-output"),
            progress_interval_ms: 1000,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            format_selector: "bestaudio/best".to_string(),
            retries: 3,
            socket_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            loudness_filter: true,
            mp3_bitrate: "192k".to_string(),
        }
    }
}

impl Default for AuxiliaryConfig {
    fn default() -> Self {
        Self {
            screenshot: true,
            screenshot_width: 1280,
            screenshot_height: 720,
            thumbnail_timeout_secs: 15,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::debug!("No config file at {}, using defaults", config_path.display());
            Ok(Self::default())
        }
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<PathBuf> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(config_path)
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("clipforge").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("fetcher.yt_dlp_path must not be empty");
        }
        if self.transcoder.ffmpeg_path.trim().is_empty() {
            anyhow::bail!("transcoder.ffmpeg_path must not be empty");
        }
        if self.app.progress_interval_ms == 0 {
            anyhow::bail!("app.progress_interval_ms must be greater than zero");
        }
        if self.auxiliary.screenshot_width == 0 || self.auxiliary.screenshot_height == 0 {
            anyhow::bail!("auxiliary screenshot resolution must be non-zero");
        }

        Ok(())
    }

    /// Interval between progress stream updates
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.app.progress_interval_ms)
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        match &self.app.work_dir {
            Some(dir) => println!("  Work Dir: {}", dir.display()),
            None => println!("  Work Dir: {}", std::env::temp_dir().display()),
        }
        println!("  Output Dir: {}", self.app.output_dir.display());
        println!("  Progress Interval: {}ms", self.app.progress_interval_ms);
        println!(
            "  yt-dlp: {} (format {})",
            self.fetcher.yt_dlp_path, self.fetcher.format_selector
        );
        println!(
            "  Retries: {}, Socket Timeout: {}s",
            self.fetcher.retries, self.fetcher.socket_timeout_secs
        );
        println!("  ffmpeg: {}", self.transcoder.ffmpeg_path);
        println!("  Loudness Filter: {}", self.transcoder.loudness_filter);
        println!(
            "  Screenshot: {} ({}x{})",
            self.auxiliary.screenshot,
            self.auxiliary.screenshot_width,
            self.auxiliary.screenshot_height
        );
    }
}
