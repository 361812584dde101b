//! Error types for the playback engine
//!
//! This module defines custom error types used throughout the crate.
//! We use thiserror for convenient error type definitions and anyhow for
//! application-level error handling in the binary.

use thiserror::Error;

/// Main error type for the playback engine
#[derive(Error, Debug)]
pub enum PlayerError {
    /// Container could not be opened or probed
    #[error("Failed to open media: {0}")]
    Open(String),

    /// Container has neither a usable audio nor video stream
    #[error("No usable audio or video stream in: {0}")]
    NoUsableStream(String),

    /// Decoder errors (codec open, packet send, frame receive, conversion)
    #[error("Decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    Audio(String),

    /// Demuxer seek errors
    #[error("Seek error: {0}")]
    Seek(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Subtitle sidecar errors
    #[error("Subtitle error: {0}")]
    Subtitle(String),

    /// File I/O errors
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ffmpeg_next::Error> for PlayerError {
    fn from(err: ffmpeg_next::Error) -> Self {
        PlayerError::Decode(format!("FFmpeg error: {}", err))
    }
}

impl PlayerError {
    /// Create a decode error from string
    pub fn decode_error<S: Into<String>>(msg: S) -> Self {
        PlayerError::Decode(msg.into())
    }
}

/// Convenience type alias for Results in the playback engine
pub type Result<T> = std::result::Result<T, PlayerError>;

/// Extension trait for converting other errors to PlayerError
pub trait IntoPlayerError<T> {
    /// Convert this error into a PlayerError with the given context
    fn open_err(self, context: &str) -> Result<T>;
    fn decode_err(self, context: &str) -> Result<T>;
    fn audio_err(self, context: &str) -> Result<T>;
    fn seek_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
    fn subtitle_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoPlayerError<T> for std::result::Result<T, E> {
    fn open_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Open(format!("{}: {}", context, e)))
    }

    fn decode_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Decode(format!("{}: {}", context, e)))
    }

    fn audio_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Audio(format!("{}: {}", context, e)))
    }

    fn seek_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Seek(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Config(format!("{}: {}", context, e)))
    }

    fn subtitle_err(self, context: &str) -> Result<T> {
        self.map_err(|e| PlayerError::Subtitle(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::PlayerError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::PlayerError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}
