//! Shared harness for integration tests
//!
//! [`SyntheticPipeline`] produces a deterministic audio/video program
//! without touching FFmpeg: fixed-rate 2x2 video frames and f32 audio
//! chunks interleaved by pts, with seek and track selection semantics
//! matching the real pipeline. [`SimulatedSink`] models a real-time audio
//! device by draining its backlog against the wall clock, which is exactly
//! what makes the audio-master playback clock advance in real time.

use parking_lot::Mutex;
use reelplayer::audio::AudioSink;
use reelplayer::media::{
    AudioChunk, AudioTrackInfo, MediaInfo, MediaPipeline, PipelineEvent, VideoFrame,
    VideoStreamInfo,
};
use reelplayer::{PlaybackSession, PlayerConfig, PlayerError, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const VIDEO_FPS: f64 = 5.0;
pub const AUDIO_RATE: u32 = 8_000;
pub const AUDIO_CHANNELS: u16 = 1;
pub const CHUNK_SECS: f64 = 0.1;

/// Deterministic in-memory media program
pub struct SyntheticPipeline {
    info: MediaInfo,
    duration_secs: f64,
    video_cursor: u64,
    audio_cursor: u64,
    total_frames: u64,
    total_chunks: u64,
    active_track: usize,
    eof_sent: bool,
    seek_log: Arc<Mutex<Vec<f64>>>,
}

impl SyntheticPipeline {
    pub fn new(duration_secs: f64, audio_tracks: usize) -> Self {
        Self::build(duration_secs, true, audio_tracks)
    }

    pub fn video_only(duration_secs: f64) -> Self {
        Self::build(duration_secs, true, 0)
    }

    pub fn audio_only(duration_secs: f64, audio_tracks: usize) -> Self {
        Self::build(duration_secs, false, audio_tracks)
    }

    fn build(duration_secs: f64, with_video: bool, audio_tracks: usize) -> Self {
        let video = with_video.then(|| VideoStreamInfo {
            stream_index: 0,
            codec: "rawvideo".to_string(),
            width: 2,
            height: 2,
            frame_rate: VIDEO_FPS,
            time_base: (1, 1000),
        });
        let tracks = (0..audio_tracks)
            .map(|i| AudioTrackInfo {
                stream_index: i + 1,
                codec: "pcm_f32le".to_string(),
                channels: AUDIO_CHANNELS,
                sample_rate: AUDIO_RATE,
                time_base: (1, 1000),
                language: None,
            })
            .collect();

        Self {
            info: MediaInfo {
                path: "synthetic.mkv".to_string(),
                container_format: "synthetic".to_string(),
                duration_secs,
                video,
                audio_tracks: tracks,
            },
            duration_secs,
            video_cursor: 0,
            audio_cursor: 0,
            total_frames: if with_video {
                (duration_secs * VIDEO_FPS).round() as u64
            } else {
                0
            },
            total_chunks: if audio_tracks > 0 {
                (duration_secs / CHUNK_SECS).round() as u64
            } else {
                0
            },
            active_track: 0,
            eof_sent: false,
            seek_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle to the list of seek targets the pipeline has received
    pub fn seek_log(&self) -> Arc<Mutex<Vec<f64>>> {
        Arc::clone(&self.seek_log)
    }

    fn frame(&self, index: u64) -> VideoFrame {
        VideoFrame {
            data: vec![index as u8; 16],
            width: 2,
            height: 2,
            pts_secs: index as f64 / VIDEO_FPS,
        }
    }

    fn chunk(&self, index: u64) -> AudioChunk {
        let samples_per_chunk = (AUDIO_RATE as f64 * CHUNK_SECS) as usize;
        let fill = (self.active_track as f32 + 1.0) * 0.01;
        AudioChunk {
            samples: vec![fill; samples_per_chunk * AUDIO_CHANNELS as usize],
            channels: AUDIO_CHANNELS,
            sample_rate: AUDIO_RATE,
            pts_secs: index as f64 * CHUNK_SECS,
        }
    }
}

impl MediaPipeline for SyntheticPipeline {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn advance(&mut self) -> Result<PipelineEvent> {
        if self.eof_sent {
            return Ok(PipelineEvent::EndOfStream);
        }

        let next_video =
            (self.video_cursor < self.total_frames).then(|| self.video_cursor as f64 / VIDEO_FPS);
        let next_audio =
            (self.audio_cursor < self.total_chunks).then(|| self.audio_cursor as f64 * CHUNK_SECS);

        // Audio wins ties so the clock already covers a frame's pts by the
        // time the frame becomes due
        match (next_video, next_audio) {
            (None, None) => {
                self.eof_sent = true;
                Ok(PipelineEvent::EndOfStream)
            }
            (Some(_), None) => {
                let frame = self.frame(self.video_cursor);
                self.video_cursor += 1;
                Ok(PipelineEvent::Video(frame))
            }
            (None, Some(_)) => {
                let chunk = self.chunk(self.audio_cursor);
                self.audio_cursor += 1;
                Ok(PipelineEvent::Audio(chunk))
            }
            (Some(video_pts), Some(audio_pts)) => {
                if audio_pts <= video_pts {
                    let chunk = self.chunk(self.audio_cursor);
                    self.audio_cursor += 1;
                    Ok(PipelineEvent::Audio(chunk))
                } else {
                    let frame = self.frame(self.video_cursor);
                    self.video_cursor += 1;
                    Ok(PipelineEvent::Video(frame))
                }
            }
        }
    }

    fn seek(&mut self, target_secs: f64) -> Result<()> {
        let target = target_secs.clamp(0.0, self.duration_secs);
        self.video_cursor = ((target * VIDEO_FPS).floor() as u64).min(self.total_frames);
        self.audio_cursor = ((target / CHUNK_SECS).floor() as u64).min(self.total_chunks);
        self.eof_sent = false;
        self.seek_log.lock().push(target);
        Ok(())
    }

    fn select_audio_track(&mut self, track: usize) -> Result<()> {
        if track >= self.info.audio_tracks.len() {
            return Err(PlayerError::InvalidInput(format!(
                "audio track {} out of range ({} available)",
                track,
                self.info.audio_tracks.len()
            )));
        }
        self.active_track = track;
        Ok(())
    }

    fn active_audio_track(&self) -> usize {
        self.active_track
    }
}

/// Audio sink that drains its backlog in real time without a device
pub struct SimulatedSink {
    state: Mutex<SimState>,
    bytes_per_second: usize,
}

struct SimState {
    queued: f64,
    last: Instant,
    paused: bool,
}

impl SimulatedSink {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                queued: 0.0,
                last: Instant::now(),
                paused: true,
            }),
            bytes_per_second: AUDIO_RATE as usize
                * AUDIO_CHANNELS as usize
                * std::mem::size_of::<f32>(),
        }
    }

    fn drain(&self, state: &mut SimState) {
        let now = Instant::now();
        if !state.paused {
            let drained =
                now.duration_since(state.last).as_secs_f64() * self.bytes_per_second as f64;
            state.queued = (state.queued - drained).max(0.0);
        }
        state.last = now;
    }
}

impl Default for SimulatedSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for SimulatedSink {
    fn queue_chunk(&self, chunk: &AudioChunk) -> Result<()> {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state.queued += chunk.byte_len() as f64;
        Ok(())
    }

    fn queued_bytes(&self) -> usize {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state.queued as usize
    }

    fn bytes_per_second(&self) -> usize {
        self.bytes_per_second
    }

    fn set_paused(&self, paused: bool) {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state.paused = paused;
    }

    fn clear(&self) {
        let mut state = self.state.lock();
        self.drain(&mut state);
        state.queued = 0.0;
    }

    fn stop(&self) {}

    fn is_realtime(&self) -> bool {
        true
    }
}

/// Config tuned for the synthetic program: the default audio backlog limit
/// would let the decode thread run minutes ahead of 8 kHz mono audio
pub fn test_config() -> PlayerConfig {
    let mut config = PlayerConfig::default();
    config.playback.audio_backlog_limit = 16 * 1024;
    config
}

/// A/V session over the synthetic pipeline, plus its seek log
pub fn av_session(
    duration_secs: f64,
    audio_tracks: usize,
) -> (PlaybackSession, Arc<Mutex<Vec<f64>>>) {
    let pipeline = SyntheticPipeline::new(duration_secs, audio_tracks);
    let seek_log = pipeline.seek_log();
    let session = PlaybackSession::with_parts(
        Box::new(pipeline),
        Arc::new(SimulatedSink::new()),
        &test_config(),
        None,
    )
    .expect("session spawn");
    (session, seek_log)
}

/// Poll until `done` or the timeout elapses
pub fn poll_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    done()
}
