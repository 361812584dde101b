//! Utility module for the playback engine
//!
//! This module provides common utilities used throughout the crate:
//! - Error handling with custom error types
//! - Configuration management
//! - Common helper functions

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::{AudioConfig, PlaybackConfig, PlayerConfig, ProbeConfig, VideoConfig};
pub use error::{PlayerError, Result};

/// Initialize the engine configuration
///
/// Loads configuration from:
/// 1. Default values
/// 2. User configuration file
/// 3. Environment variables
///
/// # Returns
///
/// Returns the loaded configuration or an error if loading fails
pub fn load_config() -> Result<PlayerConfig> {
    PlayerConfig::load()
}

/// Format a position in seconds for display
///
/// # Arguments
///
/// * `seconds` - Position to format; negative values clamp to zero
///
/// # Returns
///
/// Formatted string in the format "HH:MM:SS" or "MM:SS" for positions under an hour
pub fn format_time(seconds: f64) -> String {
    let total_secs = seconds.max(0.0) as u64;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}
