//! Playback session and its decode thread
//!
//! One session owns one pipeline, one decode thread, and the structures the
//! thread feeds. Control operations that restructure the pipeline (seek,
//! track switch) quiesce the decode thread through the [`DecodeGate`]
//! before touching anything, so decoder state is never mutated while a
//! decode step is in flight.

use crate::audio::{AudioSink, CpalSink, NullSink};
use crate::media::subtitle::{SubtitleCue, SubtitleTrack};
use crate::media::{
    AudioTrackInfo, FfmpegPipeline, MediaInfo, MediaPipeline, PipelineEvent, VideoFrame,
};
use crate::playback::queue::QueueStats;
use crate::playback::{FrameQueue, PlaybackClock, PlaybackSnapshot, PlaybackState, PlayerEvent};
use crate::utils::config::PlayerConfig;
use crate::utils::error::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use parking_lot::{Condvar, Mutex};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Quiescence gate between the decode thread and control operations
///
/// The decode thread brackets each step with `try_enter` / `exit`. A
/// control operation calls `begin_exclusive`, which turns away new
/// entrants and then waits until the user count drains to zero; from that
/// point until `end_exclusive` it owns the pipeline structures alone.
pub struct DecodeGate {
    users: Mutex<u32>,
    idle: Condvar,
    blocked: AtomicBool,
}

impl DecodeGate {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(0),
            idle: Condvar::new(),
            blocked: AtomicBool::new(false),
        }
    }

    /// Register as a decode user unless a control operation is pending
    ///
    /// The blocked flag is checked under the user lock, so an entrant can
    /// never slip in between the flag being raised and the drain wait.
    pub fn try_enter(&self) -> bool {
        let mut users = self.users.lock();
        if self.blocked.load(Ordering::Acquire) {
            return false;
        }
        *users += 1;
        true
    }

    pub fn exit(&self) {
        let mut users = self.users.lock();
        *users = users.saturating_sub(1);
        if *users == 0 {
            self.idle.notify_all();
        }
    }

    /// Turn away new entrants and wait for current ones to leave
    pub fn begin_exclusive(&self) {
        self.blocked.store(true, Ordering::Release);
        let mut users = self.users.lock();
        while *users > 0 {
            self.idle.wait(&mut users);
        }
    }

    pub fn end_exclusive(&self) {
        self.blocked.store(false, Ordering::Release);
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::Acquire)
    }
}

impl Default for DecodeGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Optional knobs for opening a session
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Discard audio even if the media has tracks
    pub no_audio: bool,
    /// Initial position in seconds
    pub start_secs: Option<f64>,
    /// Audio track to select instead of the container default
    pub audio_track: Option<usize>,
    /// SRT sidecar to load alongside the media
    pub subtitle_path: Option<PathBuf>,
}

struct SessionShared {
    pipeline: Mutex<Box<dyn MediaPipeline>>,
    gate: DecodeGate,
    queue: FrameQueue,
    sink: Arc<dyn AudioSink>,
    clock: PlaybackClock,
    state: Mutex<PlaybackState>,
    state_changed: Condvar,
    running: AtomicBool,
    events: Sender<PlayerEvent>,
    duration_secs: f64,
    late_threshold_secs: f64,
    seek_backoff: std::time::Duration,
    audio_backlog_limit: usize,
}

impl SessionShared {
    fn state(&self) -> PlaybackState {
        *self.state.lock()
    }

    fn position(&self) -> f64 {
        self.clock.now(self.sink.queued_bytes())
    }

    fn set_state(&self, new: PlaybackState) {
        let mut state = self.state.lock();
        if *state == new {
            return;
        }
        *state = new;
        self.state_changed.notify_all();
        drop(state);
        self.emit(PlayerEvent::StateChanged(new));
    }

    fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }
}

/// A loaded media file with a running decode thread
///
/// All methods take `&self`; the session is safe to drive from a UI thread
/// while the decode thread runs. Dropping the session stops playback and
/// joins the thread.
pub struct PlaybackSession {
    shared: Arc<SessionShared>,
    thread: Option<JoinHandle<()>>,
    info: MediaInfo,
    path: String,
    subtitles: Option<SubtitleTrack>,
    events_rx: Receiver<PlayerEvent>,
}

impl PlaybackSession {
    /// Open a media file with default options
    pub fn open(path: &Path, config: &PlayerConfig) -> Result<Self> {
        Self::open_with(path, config, SessionOptions::default())
    }

    /// Open a media file
    ///
    /// The audio device is opened first so the pipeline can resample
    /// straight to whatever format the device accepted. A missing or
    /// failing device degrades to the wall clock instead of failing the
    /// open.
    pub fn open_with(
        path: &Path,
        config: &PlayerConfig,
        options: SessionOptions,
    ) -> Result<Self> {
        let mut effective = config.clone();
        let sink_attempt = if options.no_audio {
            debug!("Audio disabled by request");
            None
        } else {
            match CpalSink::new(&config.audio, config.playback.audio_backlog_limit * 2) {
                Ok(sink) => {
                    effective.audio.sample_rate = sink.sample_rate();
                    effective.audio.channels = sink.channels();
                    Some(sink)
                }
                Err(e) => {
                    warn!("Audio output unavailable, falling back to wall clock: {}", e);
                    None
                }
            }
        };

        let mut pipeline = FfmpegPipeline::open(path, &effective)?;
        if let Some(track) = options.audio_track {
            if let Err(e) = pipeline.select_audio_track(track) {
                warn!("Keeping default audio track: {}", e);
            }
        }

        let subtitles = options.subtitle_path.as_deref().and_then(|p| {
            match SubtitleTrack::load(p) {
                Ok(track) => Some(track),
                Err(e) => {
                    warn!("Subtitles not loaded from {}: {}", p.display(), e);
                    None
                }
            }
        });

        let has_audio = !pipeline.info().audio_tracks.is_empty();
        let sink: Arc<dyn AudioSink> = match (has_audio, sink_attempt) {
            (true, Some(sink)) => Arc::new(sink),
            _ => Arc::new(NullSink::new(&effective.audio)),
        };

        let session = Self::with_parts(Box::new(pipeline), sink, &effective, subtitles)?;
        if let Some(start) = options.start_secs {
            if start > 0.0 {
                session.seek(start)?;
            }
        }
        Ok(session)
    }

    /// Assemble a session from prebuilt parts and spawn the decode thread
    ///
    /// This is the seam the integration tests drive synthetic pipelines
    /// and sinks through.
    pub fn with_parts(
        pipeline: Box<dyn MediaPipeline>,
        sink: Arc<dyn AudioSink>,
        config: &PlayerConfig,
        subtitles: Option<SubtitleTrack>,
    ) -> Result<Self> {
        let info = pipeline.info().clone();
        let has_audio = !info.audio_tracks.is_empty();

        let clock = if has_audio && sink.is_realtime() {
            PlaybackClock::audio_master(sink.bytes_per_second())
        } else {
            PlaybackClock::wall_clock()
        };
        debug!(
            "Clock source: {}",
            if clock.is_audio_master() { "audio" } else { "wall" }
        );

        let (events_tx, events_rx) = unbounded();
        let shared = Arc::new(SessionShared {
            pipeline: Mutex::new(pipeline),
            gate: DecodeGate::new(),
            queue: FrameQueue::new(config.playback.frame_queue_capacity),
            sink,
            clock,
            state: Mutex::new(PlaybackState::Paused),
            state_changed: Condvar::new(),
            running: AtomicBool::new(true),
            events: events_tx,
            duration_secs: info.duration_secs,
            late_threshold_secs: config.playback.late_frame_threshold().as_secs_f64(),
            seek_backoff: config.playback.seek_backoff(),
            audio_backlog_limit: config.playback.audio_backlog_limit,
        });

        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("reel-decode".to_string())
            .spawn(move || decode_loop(thread_shared))?;

        Ok(Self {
            shared,
            thread: Some(thread),
            path: info.path.clone(),
            info,
            subtitles,
            events_rx,
        })
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state() == PlaybackState::Playing
    }

    /// Current position in seconds
    pub fn current_time(&self) -> f64 {
        self.shared.position()
    }

    /// Media duration in seconds
    pub fn total_time(&self) -> f64 {
        self.shared.duration_secs
    }

    pub fn list_audio_tracks(&self) -> &[AudioTrackInfo] {
        &self.info.audio_tracks
    }

    pub fn current_audio_track(&self) -> usize {
        self.shared.pipeline.lock().active_audio_track()
    }

    /// Start or resume playback
    pub fn play(&self) {
        let mut state = self.shared.state.lock();
        if *state != PlaybackState::Paused {
            return;
        }
        self.shared.sink.set_paused(false);
        self.shared.clock.resume();
        *state = PlaybackState::Playing;
        self.shared.state_changed.notify_all();
        drop(state);
        self.shared.emit(PlayerEvent::StateChanged(PlaybackState::Playing));
        debug!("Playback running");
    }

    /// Suspend playback, freezing the position
    pub fn pause(&self) {
        let mut state = self.shared.state.lock();
        if *state != PlaybackState::Playing {
            return;
        }
        self.shared.sink.set_paused(true);
        self.shared.clock.pause();
        *state = PlaybackState::Paused;
        self.shared.state_changed.notify_all();
        drop(state);
        self.shared.emit(PlayerEvent::StateChanged(PlaybackState::Paused));
        debug!("Playback paused");
    }

    pub fn toggle_pause(&self) {
        match self.shared.state() {
            PlaybackState::Playing => self.pause(),
            PlaybackState::Paused => self.play(),
            _ => {}
        }
    }

    /// Jump to a position, clamped into `[0, duration]`
    pub fn seek(&self, target_secs: f64) -> Result<()> {
        let target = if self.shared.duration_secs > 0.0 {
            target_secs.clamp(0.0, self.shared.duration_secs)
        } else {
            target_secs.max(0.0)
        };

        let was_playing = self.suspend_for_control();
        self.shared.gate.begin_exclusive();
        let result = self.shared.pipeline.lock().seek(target);
        if result.is_ok() {
            self.shared.queue.clear();
            self.shared.sink.clear();
            self.shared.clock.reset_to(target);
        }
        self.shared.gate.end_exclusive();
        if was_playing {
            self.play();
        }

        match &result {
            Ok(()) => info!("Seeked to {:.3}s", target),
            Err(e) => warn!("Seek to {:.3}s failed: {}", target, e),
        }
        result
    }

    /// Switch to another audio track, keeping the current position
    ///
    /// Returns false and leaves the session untouched when the index is
    /// out of range or the new decoder cannot be built.
    pub fn switch_audio_track(&self, track: usize) -> bool {
        let count = self.info.audio_track_count();
        if count == 0 || track >= count {
            warn!("Audio track {} out of range ({} available)", track, count);
            return false;
        }
        if self.current_audio_track() == track {
            return true;
        }

        let resume_at = self.current_time();
        let was_playing = self.suspend_for_control();
        self.shared.gate.begin_exclusive();
        let result = {
            let mut pipeline = self.shared.pipeline.lock();
            pipeline
                .select_audio_track(track)
                .and_then(|_| pipeline.seek(resume_at))
        };
        if result.is_ok() {
            self.shared.queue.clear();
            self.shared.sink.clear();
            self.shared.clock.reset_to(resume_at);
        }
        self.shared.gate.end_exclusive();
        if was_playing {
            self.play();
        }

        match result {
            Ok(()) => {
                info!("Switched to audio track {} at {:.3}s", track, resume_at);
                self.shared.emit(PlayerEvent::TrackSwitched(track));
                true
            }
            Err(e) => {
                warn!("Audio track switch to {} failed: {}", track, e);
                self.shared.emit(PlayerEvent::Error(e.to_string()));
                false
            }
        }
    }

    /// Switch to the next track in index order, wrapping around
    pub fn cycle_audio_track(&self) -> Option<usize> {
        let next = self.info.next_audio_track(self.current_audio_track())?;
        self.switch_audio_track(next).then_some(next)
    }

    /// Next video frame due for presentation, if any
    ///
    /// Non-blocking; returns at most one frame per call. Frames older than
    /// the late threshold are discarded and counted instead of returned.
    pub fn update(&self) -> Option<VideoFrame> {
        let now = self.current_time();
        loop {
            let pts = self.shared.queue.peek_pts()?;
            if pts > now {
                return None;
            }
            let frame = self.shared.queue.pop()?;
            if now - frame.pts_secs > self.shared.late_threshold_secs {
                self.shared.queue.note_late_drop();
                debug!("Dropped frame {:.3}s behind", now - frame.pts_secs);
                continue;
            }
            return Some(frame);
        }
    }

    /// Subtitle cue covering the current position
    pub fn current_subtitle(&self) -> Option<&SubtitleCue> {
        self.subtitles.as_ref()?.cue_at(self.current_time())
    }

    pub fn has_subtitles(&self) -> bool {
        self.subtitles.is_some()
    }

    pub fn frame_stats(&self) -> QueueStats {
        self.shared.queue.stats()
    }

    /// Receiver for state and error notifications
    pub fn events(&self) -> &Receiver<PlayerEvent> {
        &self.events_rx
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            path: self.path.clone(),
            state: self.state(),
            position_secs: self.current_time(),
            duration_secs: self.total_time(),
            has_video: self.info.has_video(),
            audio_track: self.current_audio_track(),
            audio_track_count: self.info.audio_track_count(),
            frames_dropped: self.shared.queue.stats().total_dropped(),
            subtitle: self.current_subtitle().map(|cue| cue.text.clone()),
        }
    }

    /// Shut down the decode thread and the sink
    pub fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let changed = {
            let mut state = self.shared.state.lock();
            let changed = state.is_active();
            if changed {
                *state = PlaybackState::Stopped;
            }
            self.shared.state_changed.notify_all();
            changed
        };
        if changed {
            self.shared.emit(PlayerEvent::StateChanged(PlaybackState::Stopped));
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.shared.sink.stop();
        info!("Playback session stopped");
    }

    /// Pause for a control operation, reporting whether playback must be
    /// restored afterwards
    fn suspend_for_control(&self) -> bool {
        let was_playing = self.shared.state() == PlaybackState::Playing;
        if was_playing {
            self.pause();
        }
        was_playing
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Decode thread body
///
/// Each iteration decodes at most one packet worth of media. The three
/// suspension points are the pause wait, the gate backoff, and the audio
/// backlog throttle; all of them stay out of the gate so control
/// operations never wait on a sleeping thread.
fn decode_loop(shared: Arc<SessionShared>) {
    debug!("Decode thread started");
    loop {
        {
            let mut state = shared.state.lock();
            while *state == PlaybackState::Paused && shared.running.load(Ordering::Acquire) {
                shared.state_changed.wait(&mut state);
            }
            if !shared.running.load(Ordering::Acquire) || !state.is_active() {
                break;
            }
        }

        if !shared.gate.try_enter() {
            thread::sleep(shared.seek_backoff);
            continue;
        }
        let step = shared.pipeline.lock().advance();
        let mut finished = false;
        let mut errored = false;
        match step {
            Ok(event) => finished = route_event(&shared, event),
            Err(e) => {
                warn!("Decode step failed: {}", e);
                shared.emit(PlayerEvent::Error(e.to_string()));
                errored = true;
            }
        }
        shared.gate.exit();

        if finished {
            info!("Playback finished");
            shared.clock.mark_finished(shared.duration_secs);
            shared.set_state(PlaybackState::Finished);
            shared.emit(PlayerEvent::Finished);
            break;
        }
        if errored {
            thread::sleep(shared.seek_backoff);
            continue;
        }

        while shared.clock.is_audio_master()
            && shared.sink.queued_bytes() > shared.audio_backlog_limit
            && shared.running.load(Ordering::Acquire)
            && !shared.gate.is_blocked()
            && shared.state() == PlaybackState::Playing
        {
            thread::sleep(shared.seek_backoff);
        }
    }
    debug!("Decode thread exited");
}

/// Route one pipeline event; returns true at end of stream
fn route_event(shared: &SessionShared, event: PipelineEvent) -> bool {
    match event {
        PipelineEvent::Video(frame) => {
            shared.queue.push(frame);
            false
        }
        PipelineEvent::Audio(chunk) => {
            // Sink before clock, so the position never runs ahead of the
            // backlog it is derived from
            let end_pts = chunk.end_pts_secs();
            if let Err(e) = shared.sink.queue_chunk(&chunk) {
                warn!("Audio chunk dropped: {}", e);
            }
            shared.clock.on_chunk_queued(end_pts);
            false
        }
        PipelineEvent::Pending => false,
        PipelineEvent::EndOfStream => true,
    }
}
