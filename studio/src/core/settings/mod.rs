//! Studio Settings
//!
//! JSON settings with defaults for every field. Values are clamped into range
//! after loading so a hand-edited file can not put the core into an invalid
//! state.
//!
//! Lookup order: explicit path, then `$GENSTUDIO_CONFIG`, then
//! `{config_dir}/genstudio/settings.json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::jobs::PollSchedule;
use crate::core::progress::{DEFAULT_TICKER_MESSAGES, DEFAULT_TICKER_PERIOD};
use crate::core::sampler::{SamplingPolicy, DEFAULT_INTERVAL_SECONDS, DEFAULT_MAX_FRAMES};
use crate::core::{CoreError, CoreResult};

/// Environment variable overriding the settings path
pub const CONFIG_ENV: &str = "GENSTUDIO_CONFIG";

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

/// Default provider endpoint
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default download cap (500 MB)
pub const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 500 * 1024 * 1024;

/// Studio settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StudioSettings {
    #[serde(default)]
    pub provider: ProviderSettings,

    #[serde(default)]
    pub sampling: SamplingSettings,

    #[serde(default)]
    pub polling: PollingSettings,

    #[serde(default)]
    pub ticker: TickerSettings,

    /// Directory holding `ffmpeg` and `ffprobe`; searched on PATH when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_dir: Option<PathBuf>,
}

/// Provider endpoint and model selection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for text-to-image
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Model used for prompt-guided image edits
    #[serde(default = "default_edit_model")]
    pub edit_model: String,

    /// Model used for image and video analysis
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    /// Model used for video generation
    #[serde(default = "default_video_model")]
    pub video_model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_download_bytes")]
    pub max_download_bytes: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_image_model() -> String {
    "imagen-4.0-generate-001".to_string()
}

fn default_edit_model() -> String {
    "gemini-2.5-flash-image".to_string()
}

fn default_analysis_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_video_model() -> String {
    "veo-3.1-generate-preview".to_string()
}

fn default_request_timeout_secs() -> u64 {
    180
}

fn default_max_download_bytes() -> u64 {
    DEFAULT_MAX_DOWNLOAD_BYTES
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            image_model: default_image_model(),
            edit_model: default_edit_model(),
            analysis_model: default_analysis_model(),
            video_model: default_video_model(),
            request_timeout_secs: default_request_timeout_secs(),
            max_download_bytes: default_max_download_bytes(),
        }
    }
}

/// Frame sampling defaults for video analysis
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SamplingSettings {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: f64,

    #[serde(default = "default_max_frames")]
    pub max_frames: usize,
}

fn default_interval_seconds() -> f64 {
    DEFAULT_INTERVAL_SECONDS
}

fn default_max_frames() -> usize {
    DEFAULT_MAX_FRAMES
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            max_frames: default_max_frames(),
        }
    }
}

/// Status polling for long-running jobs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PollingSettings {
    #[serde(default = "default_poll_interval_secs")]
    pub interval_secs: f64,

    /// Grow the delay after each unfinished query
    #[serde(default)]
    pub backoff: bool,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: f64,
}

fn default_poll_interval_secs() -> f64 {
    10.0
}

fn default_backoff_factor() -> f64 {
    1.5
}

fn default_backoff_max_secs() -> f64 {
    60.0
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_poll_interval_secs(),
            backoff: false,
            backoff_factor: default_backoff_factor(),
            backoff_max_secs: default_backoff_max_secs(),
        }
    }
}

/// Reassurance ticker shown during video generation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TickerSettings {
    #[serde(default = "default_ticker_period_secs")]
    pub period_secs: f64,

    #[serde(default = "default_ticker_messages")]
    pub messages: Vec<String>,
}

fn default_ticker_period_secs() -> f64 {
    DEFAULT_TICKER_PERIOD.as_secs_f64()
}

fn default_ticker_messages() -> Vec<String> {
    DEFAULT_TICKER_MESSAGES.iter().map(|m| m.to_string()).collect()
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self {
            period_secs: default_ticker_period_secs(),
            messages: default_ticker_messages(),
        }
    }
}

impl StudioSettings {
    /// Clamp every value into its valid range
    ///
    /// Never fails: bad values are replaced, not rejected.
    pub fn normalize(&mut self) {
        let provider = &mut self.provider;
        provider.base_url = provider.base_url.trim().trim_end_matches('/').to_string();
        if !provider.base_url.starts_with("http://") && !provider.base_url.starts_with("https://")
        {
            warn!(
                "Ignoring invalid provider base URL '{}'",
                provider.base_url
            );
            provider.base_url = default_base_url();
        }
        normalize_model(&mut provider.image_model, default_image_model);
        normalize_model(&mut provider.edit_model, default_edit_model);
        normalize_model(&mut provider.analysis_model, default_analysis_model);
        normalize_model(&mut provider.video_model, default_video_model);
        provider.request_timeout_secs = provider.request_timeout_secs.clamp(5, 900);
        provider.max_download_bytes = provider
            .max_download_bytes
            .clamp(1024 * 1024, 4 * 1024 * 1024 * 1024);

        self.sampling.interval_seconds = clamp_f64(self.sampling.interval_seconds, 0.1, 60.0);
        self.sampling.max_frames = self.sampling.max_frames.clamp(1, 64);

        self.polling.interval_secs = clamp_f64(self.polling.interval_secs, 1.0, 300.0);
        self.polling.backoff_factor = clamp_f64(self.polling.backoff_factor, 1.0, 4.0);
        self.polling.backoff_max_secs = clamp_f64(
            self.polling.backoff_max_secs,
            self.polling.interval_secs,
            600.0,
        );

        if self
            .ffmpeg_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            self.ffmpeg_dir = None;
        }

        self.ticker.period_secs = clamp_f64(self.ticker.period_secs, 0.5, 60.0);
        self.ticker.messages.retain(|m| !m.trim().is_empty());
        if self.ticker.messages.is_empty() {
            self.ticker.messages = default_ticker_messages();
        }
    }

    /// Resolve the settings path: explicit, then `$GENSTUDIO_CONFIG`, then the
    /// per-user config directory
    pub fn resolve_path(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("genstudio").join(SETTINGS_FILE))
    }

    /// Load settings from the resolved path
    ///
    /// A file that was asked for explicitly must exist and parse; the per-user default
    /// location falls back to defaults with a warning.
    pub fn load(explicit: Option<&Path>) -> CoreResult<Self> {
        let strict = explicit.is_some()
            || std::env::var_os(CONFIG_ENV).is_some_and(|p| !p.is_empty());
        let Some(path) = Self::resolve_path(explicit) else {
            info!("No config directory available, using default settings");
            return Ok(Self::default());
        };

        if strict && !path.exists() {
            return Err(CoreError::ConfigError(format!(
                "Settings file not found: {}",
                path.display()
            )));
        }

        match Self::load_from(&path) {
            Ok(settings) => Ok(settings),
            Err(e) if !strict => {
                warn!("Failed to load settings, using defaults: {}", e);
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Load settings from a file; a missing file yields defaults
    pub fn load_from(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            info!("Settings file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::ConfigError(format!(
                "Failed to read settings file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut settings: StudioSettings = serde_json::from_str(&content).map_err(|e| {
            CoreError::ConfigError(format!(
                "Failed to parse settings file {}: {}",
                path.display(),
                e
            ))
        })?;

        settings.normalize();
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Default frame sampling policy
    pub fn sampling_policy(&self) -> CoreResult<SamplingPolicy> {
        SamplingPolicy::new(self.sampling.interval_seconds, self.sampling.max_frames)
    }

    /// Status polling schedule
    pub fn poll_schedule(&self) -> PollSchedule {
        let interval = Duration::from_secs_f64(self.polling.interval_secs);
        if self.polling.backoff {
            PollSchedule::exponential(
                interval,
                self.polling.backoff_factor,
                Duration::from_secs_f64(self.polling.backoff_max_secs),
            )
        } else {
            PollSchedule::fixed(interval)
        }
    }

    pub fn ticker_period(&self) -> Duration {
        Duration::from_secs_f64(self.ticker.period_secs)
    }
}

fn normalize_model(value: &mut String, fallback: fn() -> String) {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.contains('/') || trimmed.contains(char::is_whitespace) {
        *value = fallback();
    } else if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn clamp_f64(value: f64, min: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return min;
    }
    value.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let settings = StudioSettings::default();
        assert_eq!(settings.provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.provider.max_download_bytes, 500 * 1024 * 1024);
        assert_eq!(settings.sampling.max_frames, 16);
        assert_eq!(settings.ticker.messages.len(), 6);
        assert_eq!(settings.ticker_period(), Duration::from_secs(5));
        assert_eq!(
            settings.poll_schedule(),
            PollSchedule::fixed(Duration::from_secs(10))
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "sampling": { "maxFrames": 8 }, "polling": { "backoff": true } }"#;
        let settings: StudioSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.sampling.max_frames, 8);
        assert_eq!(settings.sampling.interval_seconds, 1.0);
        assert!(settings.polling.backoff);
        assert_eq!(settings.provider, ProviderSettings::default());
        assert!(settings.ffmpeg_dir.is_none());
    }

    #[test]
    fn test_ffmpeg_dir() {
        let json = r#"{ "ffmpegDir": "/opt/ffmpeg/bin" }"#;
        let mut settings: StudioSettings = serde_json::from_str(json).unwrap();
        settings.normalize();
        assert_eq!(settings.ffmpeg_dir, Some(PathBuf::from("/opt/ffmpeg/bin")));

        settings.ffmpeg_dir = Some(PathBuf::new());
        settings.normalize();
        assert!(settings.ffmpeg_dir.is_none());
    }

    #[test]
    fn test_normalization_clamps_values() {
        let mut settings = StudioSettings::default();
        settings.provider.base_url = "ftp://nope".to_string();
        settings.provider.video_model = "  ".to_string();
        settings.provider.request_timeout_secs = 0;
        settings.sampling.interval_seconds = f64::NAN;
        settings.sampling.max_frames = 0;
        settings.polling.interval_secs = -3.0;
        settings.polling.backoff_factor = 100.0;
        settings.ticker.messages = vec!["   ".to_string()];

        settings.normalize();

        assert_eq!(settings.provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.provider.video_model, default_video_model());
        assert_eq!(settings.provider.request_timeout_secs, 5);
        assert_eq!(settings.sampling.interval_seconds, 0.1);
        assert_eq!(settings.sampling.max_frames, 1);
        assert_eq!(settings.polling.interval_secs, 1.0);
        assert_eq!(settings.polling.backoff_factor, 4.0);
        assert_eq!(settings.ticker.messages.len(), 6);
    }

    #[test]
    fn test_base_url_trailing_slash_removed() {
        let mut settings = StudioSettings::default();
        settings.provider.base_url = "http://localhost:8080/v1beta/".to_string();
        settings.normalize();
        assert_eq!(settings.provider.base_url, "http://localhost:8080/v1beta");
    }

    #[test]
    fn test_backoff_schedule() {
        let mut settings = StudioSettings::default();
        settings.polling.backoff = true;
        settings.polling.interval_secs = 2.0;
        settings.polling.backoff_factor = 2.0;
        settings.polling.backoff_max_secs = 5.0;

        let schedule = settings.poll_schedule();
        assert_eq!(schedule.delay(0), Duration::from_secs(2));
        assert_eq!(schedule.delay(1), Duration::from_secs(4));
        assert_eq!(schedule.delay(2), Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let temp = TempDir::new().unwrap();
        let settings = StudioSettings::load_from(&temp.path().join("missing.json")).unwrap();
        assert_eq!(settings, StudioSettings::default());
    }

    #[test]
    fn test_load_file_normalizes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            r#"{ "sampling": { "intervalSeconds": 2.5, "maxFrames": 1000 } }"#,
        )
        .unwrap();

        let settings = StudioSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.sampling.interval_seconds, 2.5);
        assert_eq!(settings.sampling.max_frames, 64);

        let policy = settings.sampling_policy().unwrap();
        assert_eq!(policy.max_frames(), 64);
    }

    #[test]
    fn test_explicit_corrupt_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();

        let err = StudioSettings::load(Some(&path)).unwrap_err();
        assert!(matches!(err, CoreError::ConfigError(_)));
    }

    #[test]
    fn test_explicit_missing_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("typo-settings.json");

        let err = StudioSettings::load(Some(&path)).unwrap_err();
        assert!(matches!(err, CoreError::ConfigError(_)));
        assert!(err.is_fatal());
        assert!(err.to_string().contains("typo-settings.json"));
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        let explicit = Path::new("/tmp/custom.json");
        assert_eq!(
            StudioSettings::resolve_path(Some(explicit)),
            Some(explicit.to_path_buf())
        );
    }

    #[test]
    fn test_roundtrip_is_camel_case() {
        let json = serde_json::to_string(&StudioSettings::default()).unwrap();
        assert!(json.contains("\"maxDownloadBytes\""));
        assert!(json.contains("\"intervalSeconds\""));
        assert!(json.contains("\"periodSecs\""));
    }
}
