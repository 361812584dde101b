//! FFmpeg-backed media pipeline
//!
//! Owns the demuxer, the video and audio decoder contexts, and the output
//! converters (scaler to RGBA, resampler to interleaved f32). One packet of
//! progress per [`advance`](FfmpegPipeline::advance) call; frames decoded
//! beyond the first from a single packet are stashed and handed out on
//! subsequent calls, so the decode loop routes exactly one event at a time.

use crate::media::{probe, AudioChunk, MediaInfo, MediaPipeline, PipelineEvent, VideoFrame};
use crate::utils::config::{AudioConfig, PlayerConfig, ProbeConfig, VideoConfig};
use crate::utils::error::{PlayerError, Result};
use ffmpeg_next as ffmpeg;
use ffmpeg_next::format;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use std::collections::VecDeque;
use std::path::Path;

static FFMPEG_INIT: OnceCell<()> = OnceCell::new();

/// Run FFmpeg global init exactly once per process
fn ensure_ffmpeg() -> Result<()> {
    FFMPEG_INIT
        .get_or_try_init(|| {
            ffmpeg::init()?;
            ffmpeg::log::set_level(ffmpeg::log::Level::Warning);
            Ok::<(), ffmpeg::Error>(())
        })
        .map(|_| ())
        .map_err(PlayerError::from)
}

/// FFmpeg demux + decode + convert pipeline
pub struct FfmpegPipeline {
    input: format::context::Input,
    info: MediaInfo,
    video: Option<VideoDecoder>,
    audio: Option<AudioDecoder>,
    active_audio_track: usize,
    audio_config: AudioConfig,

    /// Events decoded but not yet handed out (multi-frame packets)
    pending: VecDeque<PipelineEvent>,

    /// End of container reached; decoders are being drained
    draining: bool,

    /// Both decoders drained; EndOfStream has been reported
    finished: bool,
}

/// Video decoder with its pixel-format converter
struct VideoDecoder {
    decoder: ffmpeg::codec::decoder::Video,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    scaler: Option<ffmpeg::software::scaling::Context>,
    /// Scaled output size; zero means source size
    out_width: u32,
    out_height: u32,
}

/// Audio decoder with its resampler
struct AudioDecoder {
    decoder: ffmpeg::codec::decoder::Audio,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    resampler: Option<ffmpeg::software::resampling::Context>,
    target_rate: u32,
    target_layout: ffmpeg::channel_layout::ChannelLayout,
    /// Continuation pts for frames that carry no timestamp
    next_pts: Option<f64>,
}

impl FfmpegPipeline {
    /// Open a container and build decoders for its best streams
    ///
    /// Degrades rather than fails when one of audio/video cannot be opened:
    /// the surviving stream plays and the absent one is recorded in
    /// [`MediaInfo`]. Fails with [`PlayerError::NoUsableStream`] only when
    /// nothing at all is decodable.
    pub fn open(path: &Path, config: &PlayerConfig) -> Result<Self> {
        ensure_ffmpeg()?;

        let path_str = path.to_string_lossy().to_string();
        let input = match build_open_options(&config.probe) {
            Some(options) => format::input_with_dictionary(&path, options),
            None => format::input(&path),
        }
        .map_err(|e| PlayerError::Open(format!("{}: {}", path_str, e)))?;

        let mut info = probe::probe_container(&input, &path_str);
        if info.video.is_none() && info.audio_tracks.is_empty() {
            return Err(PlayerError::NoUsableStream(path_str));
        }

        let video = match &info.video {
            Some(stream_info) => {
                match VideoDecoder::open(&input, stream_info.stream_index, &config.video) {
                    Ok(decoder) => Some(decoder),
                    Err(e) => {
                        warn!("Video decoder unavailable, continuing without video: {}", e);
                        None
                    }
                }
            }
            None => None,
        };
        if video.is_none() {
            info.video = None;
        }

        let active_audio_track = probe::default_audio_track(&input, &info);
        let audio = if let Some(track) = info.audio_tracks.get(active_audio_track) {
            match AudioDecoder::open(&input, track.stream_index, &config.audio) {
                Ok(decoder) => Some(decoder),
                Err(e) => {
                    warn!("Audio decoder unavailable, continuing without audio: {}", e);
                    None
                }
            }
        } else {
            None
        };
        if audio.is_none() {
            info.audio_tracks.clear();
        }

        // A codec failure on the only stream is fatal after all
        if video.is_none() && audio.is_none() {
            return Err(PlayerError::NoUsableStream(path_str));
        }

        info!(
            "Opened {} ({}, {:.2}s, video: {}, audio tracks: {})",
            path_str,
            info.container_format,
            info.duration_secs,
            info.video.is_some(),
            info.audio_tracks.len()
        );

        Ok(Self {
            input,
            info,
            video,
            audio,
            active_audio_track,
            audio_config: config.audio.clone(),
            pending: VecDeque::new(),
            draining: false,
            finished: false,
        })
    }

    /// Discard all decoder-side state across a discontinuity
    fn flush_decoders(&mut self) {
        if let Some(video) = &mut self.video {
            video.decoder.flush();
        }
        if let Some(audio) = &mut self.audio {
            audio.decoder.flush();
            audio.resampler = None;
            audio.next_pts = None;
        }
        self.pending.clear();
        self.draining = false;
        self.finished = false;
    }

    /// Read one packet and feed it to the matching decoder
    fn step_packet(&mut self) -> Result<PipelineEvent> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => {
                // Enter the drain phase: both decoders get EOF exactly once
                self.draining = true;
                if let Some(video) = &mut self.video {
                    if let Err(e) = video.decoder.send_eof() {
                        debug!("Video send_eof: {}", e);
                    }
                }
                if let Some(audio) = &mut self.audio {
                    if let Err(e) = audio.decoder.send_eof() {
                        debug!("Audio send_eof: {}", e);
                    }
                }
                return self.step_drain();
            }
            Err(e) => {
                // Transient read failure: drop the unit of work and go on
                warn!("Packet read failed: {}", e);
                return Ok(PipelineEvent::Pending);
            }
        }

        let stream_index = packet.stream();

        if let Some(video) = &mut self.video {
            if stream_index == video.stream_index {
                if let Err(e) = video.decoder.send_packet(&packet) {
                    warn!("Video packet dropped: {}", e);
                    return Ok(PipelineEvent::Pending);
                }
                video.drain_frames(&mut self.pending);
                return Ok(self.pending.pop_front().unwrap_or(PipelineEvent::Pending));
            }
        }

        if let Some(audio) = &mut self.audio {
            if stream_index == audio.stream_index {
                if let Err(e) = audio.decoder.send_packet(&packet) {
                    warn!("Audio packet dropped: {}", e);
                    return Ok(PipelineEvent::Pending);
                }
                audio.drain_chunks(&mut self.pending);
                return Ok(self.pending.pop_front().unwrap_or(PipelineEvent::Pending));
            }
        }

        // Packet for a stream we are not playing
        Ok(PipelineEvent::Pending)
    }

    /// Pull remaining frames out of the decoders after container EOF
    fn step_drain(&mut self) -> Result<PipelineEvent> {
        if let Some(video) = &mut self.video {
            video.drain_frames(&mut self.pending);
        }
        if let Some(audio) = &mut self.audio {
            audio.drain_chunks(&mut self.pending);
        }
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        self.finished = true;
        Ok(PipelineEvent::EndOfStream)
    }
}

impl MediaPipeline for FfmpegPipeline {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn advance(&mut self) -> Result<PipelineEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        if self.finished {
            return Ok(PipelineEvent::EndOfStream);
        }
        if self.draining {
            return self.step_drain();
        }
        self.step_packet()
    }

    fn seek(&mut self, target_secs: f64) -> Result<()> {
        let target = target_secs.max(0.0);
        let timestamp = (target * f64::from(ffmpeg::ffi::AV_TIME_BASE)) as i64;

        // Backward-biased: land on the nearest keyframe at or before target
        self.input
            .seek(timestamp, ..timestamp)
            .map_err(|e| PlayerError::Seek(format!("to {:.3}s: {}", target, e)))?;

        self.flush_decoders();
        debug!("Demuxer repositioned to {:.3}s", target);
        Ok(())
    }

    fn select_audio_track(&mut self, track: usize) -> Result<()> {
        let track_info = self.info.audio_tracks.get(track).ok_or_else(|| {
            PlayerError::InvalidInput(format!(
                "audio track {} of {}",
                track,
                self.info.audio_tracks.len()
            ))
        })?;

        if track == self.active_audio_track {
            return Ok(());
        }

        // Build the replacement fully before dropping the old decoder, so a
        // failure leaves the current track playing.
        let replacement =
            AudioDecoder::open(&self.input, track_info.stream_index, &self.audio_config)?;

        self.audio = Some(replacement);
        self.active_audio_track = track;
        self.pending.clear();
        info!(
            "Audio track switched to {} (stream {})",
            track, track_info.stream_index
        );
        Ok(())
    }

    fn active_audio_track(&self) -> usize {
        self.active_audio_track
    }
}

impl VideoDecoder {
    fn open(
        input: &format::context::Input,
        stream_index: usize,
        config: &VideoConfig,
    ) -> Result<Self> {
        let stream = input
            .stream(stream_index)
            .ok_or_else(|| PlayerError::decode_error("Video stream disappeared"))?;
        let time_base = stream.time_base();

        let mut context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        context.set_threading(ffmpeg::codec::threading::Config {
            kind: ffmpeg::codec::threading::Type::Frame,
            count: 0,
        });

        let decoder = context.decoder().video()?;

        Ok(Self {
            decoder,
            stream_index,
            time_base,
            scaler: None,
            out_width: config.width,
            out_height: config.height,
        })
    }

    /// Drain every frame the decoder is ready to emit
    fn drain_frames(&mut self, pending: &mut VecDeque<PipelineEvent>) {
        let mut decoded = ffmpeg::frame::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            match self.convert(&decoded) {
                Ok(frame) => pending.push_back(PipelineEvent::Video(frame)),
                Err(e) => warn!("Video frame conversion failed, frame dropped: {}", e),
            }
        }
    }

    /// Scale to RGBA and copy out as a tightly packed owned frame
    fn convert(&mut self, frame: &ffmpeg::frame::Video) -> Result<VideoFrame> {
        let pts_secs = ts_to_secs(frame.timestamp(), self.time_base).unwrap_or(0.0);

        let out_width = if self.out_width > 0 { self.out_width } else { frame.width() };
        let out_height = if self.out_height > 0 { self.out_height } else { frame.height() };

        let rebuild = match &self.scaler {
            Some(scaler) => {
                let input = scaler.input();
                input.format != frame.format()
                    || input.width != frame.width()
                    || input.height != frame.height()
            }
            None => true,
        };
        if rebuild {
            debug!(
                "Building scaler {:?} {}x{} -> RGBA {}x{}",
                frame.format(),
                frame.width(),
                frame.height(),
                out_width,
                out_height
            );
            self.scaler = Some(ffmpeg::software::scaling::Context::get(
                frame.format(),
                frame.width(),
                frame.height(),
                ffmpeg::format::Pixel::RGBA,
                out_width,
                out_height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )?);
        }

        let mut scaled = ffmpeg::frame::Video::empty();
        self.scaler
            .as_mut()
            .ok_or_else(|| PlayerError::decode_error("Scaler missing after build"))?
            .run(frame, &mut scaled)?;

        let data = tight_copy(
            scaled.data(0),
            scaled.stride(0),
            out_width as usize * 4,
            out_height as usize,
        );

        Ok(VideoFrame {
            data,
            width: out_width,
            height: out_height,
            pts_secs,
        })
    }
}

impl AudioDecoder {
    fn open(
        input: &format::context::Input,
        stream_index: usize,
        config: &AudioConfig,
    ) -> Result<Self> {
        let stream = input
            .stream(stream_index)
            .ok_or_else(|| PlayerError::decode_error("Audio stream disappeared"))?;
        let time_base = stream.time_base();

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = context.decoder().audio()?;

        Ok(Self {
            decoder,
            stream_index,
            time_base,
            resampler: None,
            target_rate: config.sample_rate,
            target_layout: ffmpeg::channel_layout::ChannelLayout::default(i32::from(
                config.channels,
            )),
            next_pts: None,
        })
    }

    /// Drain every chunk the decoder is ready to emit
    fn drain_chunks(&mut self, pending: &mut VecDeque<PipelineEvent>) {
        let mut decoded = ffmpeg::frame::Audio::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            match self.convert(&decoded) {
                // The resampler can buffer without producing output
                Ok(chunk) if chunk.samples.is_empty() => {}
                Ok(chunk) => pending.push_back(PipelineEvent::Audio(chunk)),
                Err(e) => warn!("Audio frame conversion failed, chunk dropped: {}", e),
            }
        }
    }

    /// Resample to the fixed output format as interleaved f32
    fn convert(&mut self, frame: &ffmpeg::frame::Audio) -> Result<AudioChunk> {
        // Planar f32 out of the resampler, interleaved by hand below
        let target_format = ffmpeg::format::Sample::F32(ffmpeg::format::sample::Type::Planar);

        let rebuild = match &self.resampler {
            Some(resampler) => {
                let input = resampler.input();
                input.format != frame.format()
                    || input.channel_layout != frame.channel_layout()
                    || input.rate != frame.rate()
            }
            None => true,
        };
        if rebuild {
            debug!(
                "Building resampler {:?} {}Hz -> f32 {}Hz",
                frame.format(),
                frame.rate(),
                self.target_rate
            );
            self.resampler = Some(ffmpeg::software::resampling::Context::get(
                frame.format(),
                frame.channel_layout(),
                frame.rate(),
                target_format,
                self.target_layout,
                self.target_rate,
            )?);
        }

        let mut resampled = ffmpeg::frame::Audio::empty();
        self.resampler
            .as_mut()
            .ok_or_else(|| PlayerError::decode_error("Resampler missing after build"))?
            .run(frame, &mut resampled)?;

        let sample_count = resampled.samples();
        let channels = self.target_layout.channels() as usize;
        let mut samples = Vec::with_capacity(sample_count * channels);
        if sample_count > 0 {
            let planes: Vec<&[f32]> = (0..channels).map(|c| resampled.plane::<f32>(c)).collect();
            for i in 0..sample_count {
                for plane in &planes {
                    samples.push(plane[i]);
                }
            }
        }

        let pts_secs = ts_to_secs(frame.timestamp(), self.time_base)
            .or(self.next_pts)
            .unwrap_or(0.0);

        let chunk = AudioChunk {
            samples,
            channels: channels as u16,
            sample_rate: self.target_rate,
            pts_secs,
        };
        self.next_pts = Some(chunk.end_pts_secs());
        Ok(chunk)
    }
}

/// Demuxer open options from the probe configuration
fn build_open_options(config: &ProbeConfig) -> Option<ffmpeg::Dictionary<'static>> {
    if config.probe_size == 0 && config.analyze_duration_us == 0 {
        return None;
    }
    let mut options = ffmpeg::Dictionary::new();
    if config.probe_size > 0 {
        options.set("probesize", &config.probe_size.to_string());
    }
    if config.analyze_duration_us > 0 {
        options.set("analyzeduration", &config.analyze_duration_us.to_string());
    }
    Some(options)
}

/// Stream timestamp to seconds via the stream time base
fn ts_to_secs(ts: Option<i64>, time_base: ffmpeg::Rational) -> Option<f64> {
    let ts = ts?;
    if time_base.denominator() == 0 {
        return None;
    }
    Some(ts as f64 * f64::from(time_base.numerator()) / f64::from(time_base.denominator()))
}

/// Copy a strided plane into a tightly packed buffer
fn tight_copy(data: &[u8], stride: usize, row_bytes: usize, rows: usize) -> Vec<u8> {
    if stride == row_bytes {
        return data[..row_bytes * rows].to_vec();
    }
    let mut out = Vec::with_capacity(row_bytes * rows);
    for row in 0..rows {
        let start = row * stride;
        out.extend_from_slice(&data[start..start + row_bytes]);
    }
    out
}
