//! Configuration management for the playback engine
//!
//! This module handles loading and managing engine configuration
//! from various sources including config files and environment variables.
//! Every empirically-tuned playback constant (queue depth, late-frame
//! threshold, audio backlog limit) lives here rather than in code.

use crate::utils::error::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConfig {
    /// Playback timing and buffering
    pub playback: PlaybackConfig,

    /// Audio output format and device behavior
    pub audio: AudioConfig,

    /// Video output format
    pub video: VideoConfig,

    /// Container probing
    pub probe: ProbeConfig,

    /// General settings
    pub general: GeneralConfig,
}

/// Playback timing and buffering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// Decoded video frame queue capacity
    pub frame_queue_capacity: usize,

    /// Frames later than this many milliseconds are dropped, not shown
    pub late_frame_threshold_ms: u64,

    /// Decode thread sleep while a seek or track switch is in progress
    pub seek_backoff_ms: u64,

    /// Decode thread sleeps while the audio sink holds more than this
    /// many bytes, so decode does not run unboundedly ahead of the device
    pub audio_backlog_limit: usize,
}

/// Audio output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Output sample rate in Hz
    pub sample_rate: u32,

    /// Output channel count
    pub channels: u16,

    /// Initial volume (0.0 - 1.0)
    pub volume: f32,
}

/// Video output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoConfig {
    /// Scaled output width (0 = source width)
    pub width: u32,

    /// Scaled output height (0 = source height)
    pub height: u32,
}

/// Container probing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Bytes to read while probing the container (0 = FFmpeg default)
    pub probe_size: u64,

    /// Microseconds of input to analyze for stream info (0 = FFmpeg default)
    pub analyze_duration_us: u64,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            playback: PlaybackConfig::default(),
            audio: AudioConfig::default(),
            video: VideoConfig::default(),
            probe: ProbeConfig::default(),
            general: GeneralConfig::default(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_queue_capacity: 12,
            late_frame_threshold_ms: 50,
            seek_backoff_ms: 5,
            audio_backlog_limit: 256 * 1024,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            volume: 0.7,
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            width: 0,
            height: 0,
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            probe_size: 0,
            analyze_duration_us: 0,
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl PlaybackConfig {
    /// Late-frame drop threshold as a Duration
    pub fn late_frame_threshold(&self) -> Duration {
        Duration::from_millis(self.late_frame_threshold_ms)
    }

    /// Seek backoff as a Duration
    pub fn seek_backoff(&self) -> Duration {
        Duration::from_millis(self.seek_backoff_ms)
    }
}

impl AudioConfig {
    /// Bytes per second of output at this format (f32 samples)
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * std::mem::size_of::<f32>()
    }
}

impl PlayerConfig {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. User config file (~/.config/reelplayer/config.toml on Linux)
    /// 3. Environment variables (REELPLAYER_* prefix)
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Load configuration, optionally from an explicit file path
    ///
    /// When `path` is given it replaces the user config file in the load
    /// order; a missing explicit path is an error, a missing user config
    /// file is not.
    pub fn load_with(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        match path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(PlayerError::Config(format!(
                        "Config file not found: {}",
                        explicit.display()
                    )));
                }
                config.merge_from_file(explicit)?;
            }
            None => {
                if let Some(user_path) = Self::user_config_path() {
                    if user_path.exists() {
                        config.merge_from_file(&user_path)?;
                    }
                }
            }
        }

        // Apply environment variable overrides
        config.apply_env_overrides()?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to the user config file
    pub fn save(&self) -> Result<()> {
        let path = Self::user_config_path()
            .ok_or_else(|| PlayerError::Config("Cannot determine user config path".to_string()))?;

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PlayerError::Config(format!("Failed to create config directory: {}", e)))?;
        }

        let toml = toml::to_string_pretty(self)
            .map_err(|e| PlayerError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, toml)
            .map_err(|e| PlayerError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Replace configuration from a TOML file
    // TODO: merge individual fields instead of replacing the whole tree
    fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| PlayerError::Config(format!("Failed to read config file: {}", e)))?;

        let file_config: PlayerConfig = toml::from_str(&contents)
            .map_err(|e| PlayerError::Config(format!("Failed to parse config file: {}", e)))?;

        *self = file_config;

        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        // Example: REELPLAYER_QUEUE_CAPACITY=16
        if let Ok(capacity) = std::env::var("REELPLAYER_QUEUE_CAPACITY") {
            self.playback.frame_queue_capacity = capacity.parse()
                .map_err(|_| PlayerError::Config("Invalid REELPLAYER_QUEUE_CAPACITY".to_string()))?;
        }

        if let Ok(threshold) = std::env::var("REELPLAYER_LATE_THRESHOLD_MS") {
            self.playback.late_frame_threshold_ms = threshold.parse()
                .map_err(|_| PlayerError::Config("Invalid REELPLAYER_LATE_THRESHOLD_MS".to_string()))?;
        }

        if let Ok(volume) = std::env::var("REELPLAYER_AUDIO_VOLUME") {
            self.audio.volume = volume.parse()
                .map_err(|_| PlayerError::Config("Invalid REELPLAYER_AUDIO_VOLUME".to_string()))?;
        }

        if let Ok(log_level) = std::env::var("REELPLAYER_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate queue depth
        if !(4..=64).contains(&self.playback.frame_queue_capacity) {
            return Err(PlayerError::Config(
                "Frame queue capacity must be between 4 and 64".to_string(),
            ));
        }

        // Validate late-frame threshold
        if !(1..=1000).contains(&self.playback.late_frame_threshold_ms) {
            return Err(PlayerError::Config(
                "Late frame threshold must be between 1 and 1000 ms".to_string(),
            ));
        }

        if self.playback.seek_backoff_ms == 0 || self.playback.seek_backoff_ms > 100 {
            return Err(PlayerError::Config(
                "Seek backoff must be between 1 and 100 ms".to_string(),
            ));
        }

        if self.playback.audio_backlog_limit < 16 * 1024 {
            return Err(PlayerError::Config(
                "Audio backlog limit must be at least 16 KiB".to_string(),
            ));
        }

        // Validate audio format
        if self.audio.sample_rate == 0 {
            return Err(PlayerError::Config("Sample rate must be non-zero".to_string()));
        }

        if !(1..=8).contains(&self.audio.channels) {
            return Err(PlayerError::Config(
                "Channel count must be between 1 and 8".to_string(),
            ));
        }

        // Validate audio volume
        if !(0.0..=1.0).contains(&self.audio.volume) {
            return Err(PlayerError::Config(
                "Audio volume must be between 0.0 and 1.0".to_string(),
            ));
        }

        // Validate log level
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level,
                valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("reelplayer").join("config.toml"))
    }
}
