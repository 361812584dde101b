//! Playback clock
//!
//! When a real audio device is playing, audio is the master clock: the
//! position is the pts the sink has been fed through, minus the portion
//! still sitting unplayed in its backlog. Without a device the clock falls
//! back to wall time with explicit pause bookkeeping.
//!
//! Reads are clamped monotone non-decreasing between seeks, so transient
//! dips while a chunk is half-accounted (queued to the sink but not yet
//! registered here) never show up to callers.

use parking_lot::Mutex;
use std::time::Instant;

/// Shared playback position source
pub struct PlaybackClock {
    inner: Mutex<ClockInner>,
}

struct ClockInner {
    mode: ClockMode,
    /// High-water mark of reported positions, reset on seek
    last_reported: f64,
}

enum ClockMode {
    /// Position derived from the audio sink backlog
    AudioMaster {
        /// End pts of the last chunk handed to the sink
        queued_through_secs: f64,
        bytes_per_second: f64,
    },
    /// Position derived from wall time
    WallClock {
        base_secs: f64,
        /// `None` while paused
        started: Option<Instant>,
    },
}

impl PlaybackClock {
    /// Clock driven by a real-time audio sink draining at `bytes_per_second`
    pub fn audio_master(bytes_per_second: usize) -> Self {
        Self {
            inner: Mutex::new(ClockInner {
                mode: ClockMode::AudioMaster {
                    queued_through_secs: 0.0,
                    bytes_per_second: (bytes_per_second.max(1)) as f64,
                },
                last_reported: 0.0,
            }),
        }
    }

    /// Wall-time clock for sessions with no audible audio
    pub fn wall_clock() -> Self {
        Self {
            inner: Mutex::new(ClockInner {
                mode: ClockMode::WallClock {
                    base_secs: 0.0,
                    started: None,
                },
                last_reported: 0.0,
            }),
        }
    }

    pub fn is_audio_master(&self) -> bool {
        matches!(self.inner.lock().mode, ClockMode::AudioMaster { .. })
    }

    /// Current position in seconds, never negative
    ///
    /// `queued_bytes` is the sink backlog at the time of the call; wall
    /// clocks ignore it.
    pub fn now(&self, queued_bytes: usize) -> f64 {
        let mut inner = self.inner.lock();
        let raw = match &inner.mode {
            ClockMode::AudioMaster {
                queued_through_secs,
                bytes_per_second,
            } => queued_through_secs - queued_bytes as f64 / bytes_per_second,
            ClockMode::WallClock { base_secs, started } => {
                base_secs
                    + started
                        .as_ref()
                        .map(|s| s.elapsed().as_secs_f64())
                        .unwrap_or(0.0)
            }
        };
        let clamped = raw.max(0.0);
        if clamped > inner.last_reported {
            inner.last_reported = clamped;
        }
        inner.last_reported
    }

    /// Account a chunk handed to the sink, identified by its end pts
    ///
    /// The sink must be fed first so the backlog already covers the chunk
    /// when the pts advances.
    pub fn on_chunk_queued(&self, end_pts_secs: f64) {
        let mut inner = self.inner.lock();
        if let ClockMode::AudioMaster {
            queued_through_secs,
            ..
        } = &mut inner.mode
        {
            if end_pts_secs > *queued_through_secs {
                *queued_through_secs = end_pts_secs;
            }
        }
    }

    /// Freeze a wall clock; audio-master clocks freeze via the paused sink
    pub fn pause(&self) {
        let mut inner = self.inner.lock();
        if let ClockMode::WallClock { base_secs, started } = &mut inner.mode {
            if let Some(instant) = started.take() {
                *base_secs += instant.elapsed().as_secs_f64();
            }
        }
    }

    /// Resume a wall clock
    pub fn resume(&self) {
        let mut inner = self.inner.lock();
        if let ClockMode::WallClock { started, .. } = &mut inner.mode {
            if started.is_none() {
                *started = Some(Instant::now());
            }
        }
    }

    /// Jump to a new position after a discontinuity
    ///
    /// For audio-master clocks the sink must be cleared before this call,
    /// otherwise the stale backlog would be charged against the new pts.
    pub fn reset_to(&self, secs: f64) {
        let mut inner = self.inner.lock();
        match &mut inner.mode {
            ClockMode::AudioMaster {
                queued_through_secs,
                ..
            } => {
                *queued_through_secs = secs;
            }
            ClockMode::WallClock { base_secs, started } => {
                *base_secs = secs;
                if started.is_some() {
                    *started = Some(Instant::now());
                }
            }
        }
        inner.last_reported = secs.max(0.0);
    }

    /// Pin the terminal position so the final read equals the duration
    pub fn mark_finished(&self, duration_secs: f64) {
        let mut inner = self.inner.lock();
        match &mut inner.mode {
            ClockMode::AudioMaster {
                queued_through_secs,
                ..
            } => {
                // The tail keeps draining; reads converge on the duration
                *queued_through_secs = duration_secs;
            }
            ClockMode::WallClock { base_secs, started } => {
                *base_secs = duration_secs;
                *started = None;
                inner.last_reported = duration_secs;
            }
        }
    }
}
