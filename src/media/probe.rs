//! Stream probing for opened containers
//!
//! Builds the copy-out [`MediaInfo`] registry from an FFmpeg input context:
//! the selected video stream, every decodable audio track, and the total
//! duration with its fallback chain (video stream, then audio stream, then
//! container header).

use crate::media::{AudioTrackInfo, MediaInfo, VideoStreamInfo};
use ffmpeg_next as ffmpeg;
use log::{debug, warn};

/// Build the stream registry for an opened container
///
/// Streams whose codec cannot be opened are skipped with a log line rather
/// than failing the probe; a container is usable as long as one stream
/// survives, which the caller checks.
pub(crate) fn probe_container(input: &ffmpeg::format::context::Input, path: &str) -> MediaInfo {
    let container_format = input.format().name().to_string();

    let video = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .and_then(|stream| video_stream_info(&stream));

    let mut audio_tracks = Vec::new();
    for stream in input.streams() {
        if stream.parameters().medium() != ffmpeg::media::Type::Audio {
            continue;
        }
        match audio_track_info(&stream) {
            Some(track) => audio_tracks.push(track),
            None => warn!(
                "Skipping audio stream {} (codec cannot be opened)",
                stream.index()
            ),
        }
    }

    let duration_secs = duration_secs(input, video.as_ref(), &audio_tracks);
    debug!(
        "Probed {}: format={} duration={:.2}s video={} audio_tracks={}",
        path,
        container_format,
        duration_secs,
        video.is_some(),
        audio_tracks.len()
    );

    MediaInfo {
        path: path.to_string(),
        container_format,
        duration_secs,
        video,
        audio_tracks,
    }
}

/// Position of the demuxer's preferred audio stream within the track list
pub(crate) fn default_audio_track(
    input: &ffmpeg::format::context::Input,
    info: &MediaInfo,
) -> usize {
    let best_index = input
        .streams()
        .best(ffmpeg::media::Type::Audio)
        .map(|s| s.index());

    best_index
        .and_then(|idx| {
            info.audio_tracks
                .iter()
                .position(|track| track.stream_index == idx)
        })
        .unwrap_or(0)
}

fn video_stream_info(stream: &ffmpeg::format::stream::Stream) -> Option<VideoStreamInfo> {
    let params = stream.parameters();
    let codec = codec_name(params.id());

    // Opening the codec context is the supported way to read coded
    // dimensions from stream parameters.
    let context = ffmpeg::codec::context::Context::from_parameters(params).ok()?;
    let decoder = context.decoder().video().ok()?;

    let time_base = stream.time_base();
    Some(VideoStreamInfo {
        stream_index: stream.index(),
        codec,
        width: decoder.width(),
        height: decoder.height(),
        frame_rate: frame_rate(stream),
        time_base: (time_base.numerator(), time_base.denominator()),
    })
}

fn audio_track_info(stream: &ffmpeg::format::stream::Stream) -> Option<AudioTrackInfo> {
    let params = stream.parameters();
    let codec = codec_name(params.id());

    let context = ffmpeg::codec::context::Context::from_parameters(params).ok()?;
    let decoder = context.decoder().audio().ok()?;

    let language = stream.metadata().get("language").map(|s| s.to_string());

    let time_base = stream.time_base();
    Some(AudioTrackInfo {
        stream_index: stream.index(),
        codec,
        channels: decoder.channels(),
        sample_rate: decoder.rate(),
        time_base: (time_base.numerator(), time_base.denominator()),
        language,
    })
}

fn codec_name(id: ffmpeg::codec::Id) -> String {
    ffmpeg::codec::decoder::find(id)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| format!("unknown ({:?})", id))
}

fn frame_rate(stream: &ffmpeg::format::stream::Stream) -> f64 {
    let avg = stream.avg_frame_rate();
    if avg.denominator() != 0 && avg.numerator() != 0 {
        return f64::from(avg.numerator()) / f64::from(avg.denominator());
    }
    let real = stream.rate();
    if real.denominator() != 0 && real.numerator() != 0 {
        return f64::from(real.numerator()) / f64::from(real.denominator());
    }
    24.0
}

/// Duration of a single stream in seconds, when the stream carries one
fn stream_duration_secs(
    input: &ffmpeg::format::context::Input,
    stream_index: usize,
) -> Option<f64> {
    let stream = input.stream(stream_index)?;
    let duration = stream.duration();
    if duration <= 0 {
        return None;
    }
    let tb = stream.time_base();
    if tb.denominator() == 0 {
        return None;
    }
    Some(duration as f64 * f64::from(tb.numerator()) / f64::from(tb.denominator()))
}

fn container_duration_secs(input: &ffmpeg::format::context::Input) -> Option<f64> {
    let duration = input.duration();
    if duration <= 0 {
        return None;
    }
    Some(duration as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE))
}

fn duration_secs(
    input: &ffmpeg::format::context::Input,
    video: Option<&VideoStreamInfo>,
    audio_tracks: &[AudioTrackInfo],
) -> f64 {
    if let Some(video) = video {
        if let Some(secs) = stream_duration_secs(input, video.stream_index) {
            return secs;
        }
    }
    for track in audio_tracks {
        if let Some(secs) = stream_duration_secs(input, track.stream_index) {
            return secs;
        }
    }
    container_duration_secs(input).unwrap_or(0.0)
}
