use crate::backoff::BackoffConfig;
use crate::errors::ConfigError;
use crate::metrics::DEFAULT_REPORT_INTERVAL;
use crate::types::{
    ControlsOptions, InitialProps, DEFAULT_ASPECT_RATIO, DEFAULT_AUTOHIDE_TIME,
    DEFAULT_POSTER_LIVE_UPDATE, DEFAULT_TIMEOUT, DEFAULT_VOLUME_LEVEL,
};
use common::{PlaybackRate, VideoQuality};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Controller configuration, loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Initial props of every player
    pub player: PlayerConfig,

    /// Stream access credentials
    pub access: AccessConfig,

    /// Listener and effect options
    pub controls: ControlsConfig,

    /// Reconnect backoff
    pub backoff: BackoffConfig,

    /// Metrics reporting
    pub metrics: MetricsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub autoplay: bool,

    /// Width over height of the HLS player surface
    pub aspect_ratio: f64,

    /// Enable keyboard shortcuts on the container
    pub hotkeys: bool,

    /// WebRTC SDP negotiation and can-play timeout
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub timeout: Duration,

    /// Poster refresh period of live streams
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub poster_live_update: Duration,

    /// Clip length in seconds
    pub clip_length: Option<u32>,

    /// Volume level between 0 and 1
    pub volume: f64,

    /// Lock the playback rate at 1x
    pub constant_playback_rate: bool,

    pub video_quality: VideoQuality,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub jwt: Option<String>,
    pub access_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Controls autohide delay, zero disables it
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub autohide: Duration,

    /// Options handed to the HLS adapter untouched
    pub hls: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Reporting interval
    #[serde(serialize_with = "crate::serde_helpers::serialize_duration")]
    #[serde(deserialize_with = "crate::serde_helpers::deserialize_duration")]
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            autoplay: false,
            aspect_ratio: DEFAULT_ASPECT_RATIO,
            hotkeys: true,
            timeout: DEFAULT_TIMEOUT,
            poster_live_update: DEFAULT_POSTER_LIVE_UPDATE,
            clip_length: None,
            volume: DEFAULT_VOLUME_LEVEL,
            constant_playback_rate: false,
            video_quality: VideoQuality::Auto,
        }
    }
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            autohide: DEFAULT_AUTOHIDE_TIME,
            hls: HashMap::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: DEFAULT_REPORT_INTERVAL,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ControllerConfig {
    /// Initial props for a new player store.
    pub fn to_initial_props(&self) -> InitialProps {
        let player = &self.player;
        InitialProps {
            autoplay: player.autoplay,
            aspect_ratio: Some(player.aspect_ratio),
            access_key: self.access.access_key.clone(),
            jwt: self.access.jwt.clone(),
            timeout: player.timeout,
            hotkeys: player.hotkeys,
            poster_live_update: player.poster_live_update,
            clip_length: player.clip_length,
            volume: player.volume,
            playback_rate: if player.constant_playback_rate {
                PlaybackRate::Constant
            } else {
                PlaybackRate::default()
            },
            video_quality: player.video_quality,
        }
    }

    pub fn to_controls_options(&self) -> ControlsOptions {
        ControlsOptions {
            autohide: self.controls.autohide,
            hls_options: self.controls.hls.clone(),
            request_hook: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let player = &self.player;

        if !(0.0..=1.0).contains(&player.volume) {
            return Err(invalid("Volume must be between 0 and 1"));
        }

        if !player.aspect_ratio.is_finite() || player.aspect_ratio <= 0.0 {
            return Err(invalid("Aspect ratio must be greater than 0"));
        }

        if player.timeout.is_zero() {
            return Err(invalid("Timeout must be greater than 0"));
        }

        if player.clip_length == Some(0) {
            return Err(invalid("Clip length must be greater than 0 when set"));
        }

        let backoff = &self.backoff;
        if backoff.base_delay.is_zero() {
            return Err(invalid("Backoff base delay must be greater than 0"));
        }

        if !backoff.multiplier.is_finite() || backoff.multiplier < 1.0 {
            return Err(invalid("Backoff multiplier must be at least 1"));
        }

        if backoff.max_delay.is_some_and(|max| max < backoff.base_delay) {
            return Err(invalid("Backoff max delay must not be below the base delay"));
        }

        if self.metrics.enabled && self.metrics.interval.is_zero() {
            return Err(invalid("Metrics interval must be greater than 0"));
        }

        let level = self.logging.level.to_ascii_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(invalid(format!("Unknown log level: {}", self.logging.level)));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        message: message.into(),
    }
}

/// Configuration manager for loading, saving, and validating configurations
pub struct ConfigManager {
    config_path: PathBuf,
    config: ControllerConfig,
}

impl ConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: ControllerConfig::default(),
        }
    }

    /// Load configuration from file, writing the defaults when it is missing.
    pub async fn load(&mut self) -> Result<(), ConfigError> {
        if !self.config_path.exists() {
            info!(
                "No config at {}, writing defaults",
                self.config_path.display()
            );
            self.save().await?;
            return Ok(());
        }

        let content = tokio::fs::read_to_string(&self.config_path)
            .await
            .map_err(|source| io_error(&self.config_path, source))?;

        let config: ControllerConfig = toml::from_str(&content)?;
        config.validate()?;
        debug!("Loaded config from {}", self.config_path.display());
        self.config = config;
        Ok(())
    }

    pub async fn save(&self) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(&self.config)?;

        if let Some(parent) = self.config_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        tokio::fs::write(&self.config_path, content)
            .await
            .map_err(|source| io_error(&self.config_path, source))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn get_config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn get_config_mut(&mut self) -> &mut ControllerConfig {
        &mut self.config
    }

    pub fn update_config(&mut self, config: ControllerConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.config.validate()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Environment-based configuration override
pub struct EnvConfigOverride;

impl EnvConfigOverride {
    pub const ACCESS_KEY: &'static str = "MEDIA_CONTROLLER_ACCESS_KEY";
    pub const JWT: &'static str = "MEDIA_CONTROLLER_JWT";
    pub const TIMEOUT_MS: &'static str = "MEDIA_CONTROLLER_TIMEOUT_MS";
    pub const AUTOHIDE_MS: &'static str = "MEDIA_CONTROLLER_AUTOHIDE_MS";
    pub const LOG_LEVEL: &'static str = "MEDIA_CONTROLLER_LOG_LEVEL";

    /// Apply environment variable overrides to configuration
    pub fn apply_overrides(config: &mut ControllerConfig) {
        Self::apply_from(config, |name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup. Unparseable values
    /// are ignored.
    pub fn apply_from(config: &mut ControllerConfig, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(Self::ACCESS_KEY) {
            config.access.access_key = Some(key);
        }
        if let Some(jwt) = lookup(Self::JWT) {
            config.access.jwt = Some(jwt);
        }

        if let Some(ms) = lookup(Self::TIMEOUT_MS).and_then(|v| v.parse::<u64>().ok()) {
            config.player.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = lookup(Self::AUTOHIDE_MS).and_then(|v| v.parse::<u64>().ok()) {
            config.controls.autohide = Duration::from_millis(ms);
        }

        if let Some(level) = lookup(Self::LOG_LEVEL) {
            config.logging.level = level;
        }
    }
}
