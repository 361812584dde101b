//! Playback engine: session, clock, and frame queue
//!
//! The [`PlaybackSession`] owns one media pipeline, one decode thread, and
//! the shared structures the thread feeds: a bounded [`FrameQueue`] for
//! video and an audio sink whose backlog drives the [`PlaybackClock`].

pub mod clock;
pub mod queue;
pub mod session;

pub use clock::PlaybackClock;
pub use queue::{FrameQueue, QueueStats};
pub use session::{PlaybackSession, SessionOptions};

use serde::Serialize;
use std::fmt;

/// Lifecycle state of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlaybackState {
    /// Decoding suspended, position frozen
    Paused,
    /// Decode thread running, clock advancing
    Playing,
    /// End of stream reached; terminal, not an error
    Finished,
    /// Shut down by request
    Stopped,
}

impl PlaybackState {
    /// Whether the session still responds to transport controls
    pub fn is_active(&self) -> bool {
        matches!(self, PlaybackState::Playing | PlaybackState::Paused)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlaybackState::Paused => "paused",
            PlaybackState::Playing => "playing",
            PlaybackState::Finished => "finished",
            PlaybackState::Stopped => "stopped",
        };
        write!(f, "{}", name)
    }
}

/// Notifications published by the session over its event channel
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StateChanged(PlaybackState),
    TrackSwitched(usize),
    Finished,
    Error(String),
}

/// Point-in-time view of a session, serializable for status output
#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    pub path: String,
    pub state: PlaybackState,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub has_video: bool,
    pub audio_track: usize,
    pub audio_track_count: usize,
    pub frames_dropped: u64,
    pub subtitle: Option<String>,
}
