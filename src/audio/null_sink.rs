//! Sink that discards samples
//!
//! Stands in when no device is available, when the user disabled audio, or
//! when the media has no audio track. It reports an empty backlog, so the
//! session falls back to the wall clock for timing.

use crate::audio::AudioSink;
use crate::media::AudioChunk;
use crate::utils::config::AudioConfig;
use crate::utils::error::Result;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct NullSink {
    bytes_per_second: usize,
    discarded_bytes: AtomicU64,
}

impl NullSink {
    pub fn new(config: &AudioConfig) -> Self {
        Self {
            bytes_per_second: config.bytes_per_second(),
            discarded_bytes: AtomicU64::new(0),
        }
    }

    pub fn discarded_bytes(&self) -> u64 {
        self.discarded_bytes.load(Ordering::Relaxed)
    }
}

impl AudioSink for NullSink {
    fn queue_chunk(&self, chunk: &AudioChunk) -> Result<()> {
        self.discarded_bytes
            .fetch_add(chunk.byte_len() as u64, Ordering::Relaxed);
        Ok(())
    }

    fn queued_bytes(&self) -> usize {
        0
    }

    fn bytes_per_second(&self) -> usize {
        self.bytes_per_second
    }

    fn set_paused(&self, _paused: bool) {}

    fn clear(&self) {}

    fn stop(&self) {}

    fn is_realtime(&self) -> bool {
        false
    }
}
