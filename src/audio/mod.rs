//! Audio output sinks
//!
//! The decode thread hands interleaved f32 chunks to an [`AudioSink`]; the
//! sink's backlog in bytes is what the playback clock divides by to turn
//! "queued through pts" into "position now". [`CpalSink`] feeds a real
//! device, [`NullSink`] swallows samples for headless and video-only runs.

pub mod cpal_sink;
pub mod null_sink;

pub use cpal_sink::CpalSink;
pub use null_sink::NullSink;

use crate::media::AudioChunk;
use crate::utils::error::Result;

/// Destination for decoded audio samples
///
/// Implementations are shared across the decode and control threads, so
/// every method takes `&self` and must be internally synchronized.
pub trait AudioSink: Send + Sync {
    /// Append a chunk to the playback backlog
    fn queue_chunk(&self, chunk: &AudioChunk) -> Result<()>;

    /// Bytes queued but not yet played
    fn queued_bytes(&self) -> usize;

    /// Drain rate of the device in bytes per second
    fn bytes_per_second(&self) -> usize;

    /// Silence output without consuming the backlog
    fn set_paused(&self, paused: bool);

    /// Drop the entire backlog, for seeks and track switches
    fn clear(&self);

    /// Tear down the output stream
    fn stop(&self);

    /// Whether the sink drains in real time and can drive the clock
    fn is_realtime(&self) -> bool;

    /// Callback invocations that ran short of samples
    fn underruns(&self) -> u64 {
        0
    }
}
