//! Audio/video synchronized playback engine for a console media player.
//!
//! One [`PlaybackSession`](playback::PlaybackSession) per open file: it
//! owns an FFmpeg-backed demux/decode pipeline, a single decode thread,
//! a bounded video frame queue, and an audio sink whose backlog drives
//! the playback clock. The embedding surface polls
//! [`update()`](playback::PlaybackSession::update) for frames that are
//! due and reads position through the clock; transport control (pause,
//! seek, audio track switching) quiesces the decode thread before
//! touching any decoder state.
//!
//! Timing is audio-master whenever a real output device is playing:
//! position is the pts fed to the sink minus what still sits unplayed in
//! its backlog. Video-only files, `--no-audio` runs, and headless
//! environments fall back to a wall clock with pause bookkeeping.

pub mod audio;
pub mod media;
pub mod playback;
pub mod utils;

pub use media::{AudioChunk, MediaInfo, MediaPipeline, PipelineEvent, VideoFrame};
pub use playback::{
    PlaybackSession, PlaybackSnapshot, PlaybackState, PlayerEvent, SessionOptions,
};
pub use utils::{format_time, PlayerConfig, PlayerError, Result};
