//! Media pipeline module for the playback engine
//!
//! This module defines the session-facing pipeline abstraction: one object
//! owning the demuxer, the per-stream decoders, and the output converters
//! (scaler for video, resampler for audio). The decode thread drives it one
//! packet at a time through [`MediaPipeline::advance`]; seeks and audio
//! track switches go through the same object under the session's
//! quiescence barrier.

mod ffmpeg_pipeline;
mod probe;
pub mod subtitle;

pub use ffmpeg_pipeline::FfmpegPipeline;

use crate::utils::error::Result;
use serde::Serialize;

/// Immutable description of an opened container
///
/// Built once at open, handed to callers by value. Absent streams are
/// recorded rather than erroring: `video: None` is the defined "no video"
/// state and an empty `audio_tracks` means wall-clock playback.
#[derive(Debug, Clone, Serialize)]
pub struct MediaInfo {
    /// Source path or URL
    pub path: String,

    /// Container format name as reported by the demuxer
    pub container_format: String,

    /// Total duration in seconds
    ///
    /// Taken from the video stream, falling back to the audio stream and
    /// then to the container header when a stream does not carry one.
    pub duration_secs: f64,

    /// Active video stream, if the container has a decodable one
    pub video: Option<VideoStreamInfo>,

    /// All decodable audio tracks, in container order
    pub audio_tracks: Vec<AudioTrackInfo>,
}

/// Video stream description
#[derive(Debug, Clone, Serialize)]
pub struct VideoStreamInfo {
    /// Stream index inside the container
    pub stream_index: usize,

    /// Codec name
    pub codec: String,

    /// Coded width in pixels
    pub width: u32,

    /// Coded height in pixels
    pub height: u32,

    /// Average frame rate in frames per second
    pub frame_rate: f64,

    /// Stream time base as (numerator, denominator)
    pub time_base: (i32, i32),
}

/// Audio track description
#[derive(Debug, Clone, Serialize)]
pub struct AudioTrackInfo {
    /// Stream index inside the container
    pub stream_index: usize,

    /// Codec name
    pub codec: String,

    /// Channel count
    pub channels: u16,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Stream time base as (numerator, denominator)
    pub time_base: (i32, i32),

    /// Language tag from stream metadata, if present
    pub language: Option<String>,
}

impl MediaInfo {
    /// Whether the container has a decodable video stream
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /// Number of decodable audio tracks
    pub fn audio_track_count(&self) -> usize {
        self.audio_tracks.len()
    }

    /// Track index after `current`, wrapping at the end
    ///
    /// Returns `None` when there is nothing to cycle to (zero or one track,
    /// or `current` out of range).
    pub fn next_audio_track(&self, current: usize) -> Option<usize> {
        let count = self.audio_tracks.len();
        if count < 2 || current >= count {
            return None;
        }
        Some((current + 1) % count)
    }
}

/// One decoded video frame in the fixed output pixel format (RGBA8)
///
/// Owned value: produced by the pipeline, moved into the frame queue, then
/// moved out to the caller, which releases it after upload.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Tightly packed RGBA pixel data (width * height * 4 bytes)
    pub data: Vec<u8>,

    /// Width in pixels
    pub width: u32,

    /// Height in pixels
    pub height: u32,

    /// Presentation timestamp in seconds
    pub pts_secs: f64,
}

impl VideoFrame {
    /// Total pixel data size in bytes
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }
}

/// One decoded, resampled audio chunk in the fixed output format
///
/// Interleaved f32 samples; pushed straight to the audio sink, never
/// through the frame queue.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved samples (frame-major: L R L R ...)
    pub samples: Vec<f32>,

    /// Channel count
    pub channels: u16,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Presentation timestamp of the first sample, in seconds
    pub pts_secs: f64,
}

impl AudioChunk {
    /// Number of sample frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Chunk duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Media time just past the last sample in this chunk
    pub fn end_pts_secs(&self) -> f64 {
        self.pts_secs + self.duration_secs()
    }

    /// Size of the sample data in bytes
    pub fn byte_len(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

/// Outcome of one pipeline step
#[derive(Debug)]
pub enum PipelineEvent {
    /// A video frame ready for the frame queue
    Video(VideoFrame),

    /// An audio chunk ready for the output sink
    Audio(AudioChunk),

    /// A unit of work was consumed without producing output
    ///
    /// Covers packets for unselected streams, decoders still buffering,
    /// and transient decode failures (logged and dropped).
    Pending,

    /// Both decoders are drained; playback is finished
    EndOfStream,
}

/// Session-facing pipeline contract
///
/// One packet of progress per [`advance`](Self::advance) call. The structural
/// mutators ([`seek`](Self::seek), [`select_audio_track`](Self::select_audio_track))
/// must only run while the caller holds the decode quiescence barrier; the
/// pipeline itself is not internally synchronized.
pub trait MediaPipeline: Send {
    /// Stream descriptors for the opened container
    fn info(&self) -> &MediaInfo;

    /// Read one packet, decode, convert, and report what was produced
    ///
    /// Returns [`PipelineEvent::EndOfStream`] exactly once after both
    /// decoders have been flushed and drained; calls past that point keep
    /// returning `EndOfStream`.
    fn advance(&mut self) -> Result<PipelineEvent>;

    /// Reposition to the nearest keyframe at or before `target_secs`
    ///
    /// Flushes decoder state and rebuilds the resampler so no stale frames
    /// bleed across the discontinuity. On failure the read cursor is
    /// wherever the demuxer left it; the caller resumes best-effort.
    fn seek(&mut self, target_secs: f64) -> Result<()>;

    /// Replace the active audio decoder with the given track
    ///
    /// `track` indexes [`MediaInfo::audio_tracks`]. The replacement decoder
    /// and resampler are fully constructed before the old ones are dropped;
    /// on failure the previous track stays active and selected.
    fn select_audio_track(&mut self, track: usize) -> Result<()>;

    /// Index of the currently selected audio track
    fn active_audio_track(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_track_info() -> MediaInfo {
        MediaInfo {
            path: "test.mkv".to_string(),
            container_format: "matroska".to_string(),
            duration_secs: 120.0,
            video: Some(VideoStreamInfo {
                stream_index: 0,
                codec: "h264".to_string(),
                width: 1920,
                height: 1080,
                frame_rate: 24.0,
                time_base: (1, 1000),
            }),
            audio_tracks: vec![
                AudioTrackInfo {
                    stream_index: 1,
                    codec: "aac".to_string(),
                    channels: 2,
                    sample_rate: 48_000,
                    time_base: (1, 48_000),
                    language: Some("eng".to_string()),
                },
                AudioTrackInfo {
                    stream_index: 2,
                    codec: "ac3".to_string(),
                    channels: 6,
                    sample_rate: 48_000,
                    time_base: (1, 48_000),
                    language: Some("jpn".to_string()),
                },
            ],
        }
    }

    #[test]
    fn test_media_info_queries() {
        let info = two_track_info();
        assert!(info.has_video());
        assert_eq!(info.audio_track_count(), 2);
    }

    #[test]
    fn test_next_audio_track_wraps() {
        let info = two_track_info();
        assert_eq!(info.next_audio_track(0), Some(1));
        assert_eq!(info.next_audio_track(1), Some(0));
        assert_eq!(info.next_audio_track(5), None);
    }

    #[test]
    fn test_next_audio_track_single_track() {
        let mut info = two_track_info();
        info.audio_tracks.truncate(1);
        assert_eq!(info.next_audio_track(0), None);
    }

    #[test]
    fn test_audio_chunk_timing() {
        let chunk = AudioChunk {
            samples: vec![0.0; 8000],
            channels: 2,
            sample_rate: 8000,
            pts_secs: 1.5,
        };
        assert_eq!(chunk.frame_count(), 4000);
        assert!((chunk.duration_secs() - 0.5).abs() < 1e-9);
        assert!((chunk.end_pts_secs() - 2.0).abs() < 1e-9);
        assert_eq!(chunk.byte_len(), 32_000);
    }

    #[test]
    fn test_video_frame_size() {
        let frame = VideoFrame {
            data: vec![0u8; 64 * 48 * 4],
            width: 64,
            height: 48,
            pts_secs: 0.0,
        };
        assert_eq!(frame.size_bytes(), 64 * 48 * 4);
    }
}
