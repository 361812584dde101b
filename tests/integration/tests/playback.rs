//! End-to-end playback behavior over a synthetic media program
//!
//! Timing-sensitive tests run under `#[serial]` so they are not skewed by
//! CPU contention from parallel test threads.

use reelplayer::audio::NullSink;
use reelplayer::media::subtitle::SubtitleTrack;
use reelplayer::playback::QueueStats;
use reelplayer::{PlaybackSession, PlaybackState, PlayerEvent};
use reelplayer_integration_tests::{
    av_session, poll_until, test_config, SimulatedSink, SyntheticPipeline,
};
use serial_test::serial;
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
#[serial]
fn program_plays_to_completion() {
    let (session, _) = av_session(10.0, 1);
    session.play();

    // Drive presentation the way a render loop would and keep every
    // returned frame's pts for ordering checks
    let start = Instant::now();
    let mut presented: Vec<f64> = Vec::new();
    while start.elapsed() < Duration::from_secs_f64(10.5) {
        if let Some(frame) = session.update() {
            presented.push(frame.pts_secs);
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    assert!(!session.is_playing());
    assert_eq!(session.state(), PlaybackState::Finished);
    assert_eq!(session.current_time(), 10.0);
    assert_eq!(session.total_time(), 10.0);

    // 50 frames in the program; allow a few late drops under load
    assert!(
        presented.len() >= 40,
        "expected most frames presented, got {}",
        presented.len()
    );
    assert!(
        presented.windows(2).all(|w| w[0] < w[1]),
        "presented pts must be strictly increasing: {presented:?}"
    );
}

#[test]
#[serial]
fn position_is_monotonic_while_playing() {
    let (mut session, _) = av_session(10.0, 1);
    session.play();

    let mut prev = session.current_time();
    for _ in 0..100 {
        std::thread::sleep(Duration::from_millis(10));
        let now = session.current_time();
        assert!(now >= prev, "position went backward: {now} < {prev}");
        prev = now;
    }
    assert!(prev > 0.5, "position barely advanced: {prev}");

    session.stop();
}

#[test]
#[serial]
fn pause_freezes_position() {
    let (mut session, _) = av_session(10.0, 1);
    session.play();
    std::thread::sleep(Duration::from_millis(300));

    session.pause();
    // Let any in-flight decode iteration land before sampling
    std::thread::sleep(Duration::from_millis(50));
    let frozen = session.current_time();
    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(session.current_time(), frozen);

    session.play();
    std::thread::sleep(Duration::from_millis(150));
    assert!(session.current_time() > frozen);

    session.stop();
}

#[test]
fn seek_clamps_to_media_bounds() -> anyhow::Result<()> {
    let (session, seek_log) = av_session(10.0, 1);

    session.seek(-50.0)?;
    assert_eq!(session.current_time(), 0.0);

    session.seek(9999.0)?;
    assert_eq!(session.current_time(), 10.0);

    session.seek(4.5)?;
    assert_eq!(session.current_time(), 4.5);

    assert_eq!(*seek_log.lock(), vec![0.0, 10.0, 4.5]);
    Ok(())
}

#[test]
#[serial]
fn seek_while_playing_resumes_from_target() -> anyhow::Result<()> {
    let (mut session, _) = av_session(10.0, 1);
    session.play();
    std::thread::sleep(Duration::from_millis(200));

    session.seek(5.0)?;
    assert!(session.is_playing());

    let mut first_pts = None;
    poll_until(Duration::from_millis(1500), || {
        if let Some(frame) = session.update() {
            first_pts = Some(frame.pts_secs);
        }
        first_pts.is_some()
    });

    let pts = first_pts.expect("no frame presented after seek");
    assert!((4.9..=5.7).contains(&pts), "first frame pts {pts}");
    let position = session.current_time();
    assert!(
        (4.9..=5.7).contains(&position),
        "position after seek {position}"
    );

    session.stop();
    Ok(())
}

#[test]
#[serial]
fn track_switch_preserves_position() {
    let (mut session, _) = av_session(10.0, 3);
    session.play();
    std::thread::sleep(Duration::from_millis(600));

    let before = session.current_time();
    assert!(session.switch_audio_track(1));
    assert_eq!(session.current_audio_track(), 1);
    let after = session.current_time();
    assert!(
        (after - before).abs() <= 0.1,
        "switch moved position from {before} to {after}"
    );
    assert!(session.is_playing());

    // Out-of-range selection leaves the session untouched
    assert!(!session.switch_audio_track(99));
    assert_eq!(session.current_audio_track(), 1);

    assert_eq!(session.cycle_audio_track(), Some(2));
    assert_eq!(session.cycle_audio_track(), Some(0));

    let events: Vec<PlayerEvent> = session.events().try_iter().collect();
    assert!(events.contains(&PlayerEvent::TrackSwitched(1)), "{events:?}");
    assert!(events.contains(&PlayerEvent::TrackSwitched(2)), "{events:?}");

    session.stop();
}

#[test]
fn cycle_with_single_track_is_none() {
    let (session, _) = av_session(10.0, 1);
    assert_eq!(session.cycle_audio_track(), None);
    assert_eq!(session.current_audio_track(), 0);
}

#[test]
fn frame_queue_keeps_most_recent() {
    let config = test_config();
    let pipeline = SyntheticPipeline::video_only(10.0);
    let session = PlaybackSession::with_parts(
        Box::new(pipeline),
        Arc::new(NullSink::new(&config.audio)),
        &config,
        None,
    )
    .expect("session spawn");

    // Without audio the decode thread is unthrottled and runs the whole
    // program through the bounded queue almost immediately
    session.play();
    assert!(
        poll_until(Duration::from_secs(2), || session.state()
            == PlaybackState::Finished),
        "decode did not finish"
    );
    assert_eq!(session.current_time(), 10.0);

    let stats: QueueStats = session.frame_stats();
    assert_eq!(stats.len, config.playback.frame_queue_capacity);
    assert_eq!(
        stats.dropped_overflow as usize,
        50 - config.playback.frame_queue_capacity
    );

    // The survivors are all far behind the finished clock, so presentation
    // discards them as late
    assert!(session.update().is_none());
    let stats = session.frame_stats();
    assert_eq!(stats.len, 0);
    assert_eq!(
        stats.dropped_late as usize,
        config.playback.frame_queue_capacity
    );
}

#[test]
#[serial]
fn audio_only_session_advances_without_video() {
    let pipeline = SyntheticPipeline::audio_only(10.0, 1);
    let mut session = PlaybackSession::with_parts(
        Box::new(pipeline),
        Arc::new(SimulatedSink::new()),
        &test_config(),
        None,
    )
    .expect("session spawn");

    assert!(!session.info().has_video());

    session.play();
    std::thread::sleep(Duration::from_millis(400));
    let position = session.current_time();
    assert!(
        position > 0.15 && position < 1.2,
        "audio-only position {position}"
    );
    assert!(session.update().is_none());

    let snapshot = session.snapshot();
    assert!(!snapshot.has_video);
    assert_eq!(snapshot.audio_track_count, 1);

    session.stop();
}

#[test]
fn subtitles_follow_seeks() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("program.srt");
    let mut file = std::fs::File::create(&path)?;
    write!(
        file,
        "1\n00:00:01,000 --> 00:00:02,500\nHello there\n\n\
         2\n00:00:05,000 --> 00:00:06,000\nSecond line\n"
    )?;

    let subtitles = SubtitleTrack::load(&path)?;
    let session = PlaybackSession::with_parts(
        Box::new(SyntheticPipeline::new(10.0, 1)),
        Arc::new(SimulatedSink::new()),
        &test_config(),
        Some(subtitles),
    )
    .expect("session spawn");

    assert!(session.has_subtitles());

    session.seek(1.5)?;
    assert_eq!(
        session.current_subtitle().map(|cue| cue.text.as_str()),
        Some("Hello there")
    );
    assert_eq!(session.snapshot().subtitle.as_deref(), Some("Hello there"));

    session.seek(5.5)?;
    assert_eq!(
        session.current_subtitle().map(|cue| cue.text.as_str()),
        Some("Second line")
    );

    session.seek(8.0)?;
    assert!(session.current_subtitle().is_none());
    Ok(())
}

#[test]
#[serial]
fn seek_storm_keeps_session_consistent() -> anyhow::Result<()> {
    let (mut session, _) = av_session(10.0, 2);
    session.play();

    // Hammer controls against the live decode thread
    for i in 0..40 {
        session.seek((i % 10) as f64 * 0.7)?;
        if i % 5 == 0 {
            assert!(session.switch_audio_track((i / 5) % 2));
        }
    }

    session.seek(1.0)?;
    let mut first_pts = None;
    poll_until(Duration::from_secs(2), || {
        if let Some(frame) = session.update() {
            first_pts = Some(frame.pts_secs);
        }
        first_pts.is_some()
    });

    let pts = first_pts.expect("no frame presented after seek storm");
    assert!((0.9..=1.8).contains(&pts), "first frame pts {pts}");
    assert!(session.is_playing());

    session.stop();
    Ok(())
}

#[test]
#[serial]
fn lifecycle_events_are_reported() {
    let (session, _) = av_session(3.0, 1);
    session.play();

    assert!(
        poll_until(Duration::from_secs(5), || session.state()
            == PlaybackState::Finished),
        "program did not finish"
    );

    let events: Vec<PlayerEvent> = session.events().try_iter().collect();
    assert!(
        events.contains(&PlayerEvent::StateChanged(PlaybackState::Playing)),
        "{events:?}"
    );
    assert!(
        events.contains(&PlayerEvent::StateChanged(PlaybackState::Finished)),
        "{events:?}"
    );
    assert!(events.contains(&PlayerEvent::Finished), "{events:?}");
}

#[test]
#[serial]
fn stop_is_idempotent() {
    let (mut session, _) = av_session(10.0, 1);
    session.play();
    std::thread::sleep(Duration::from_millis(150));

    session.stop();
    assert_eq!(session.state(), PlaybackState::Stopped);
    assert!(!session.is_playing());

    session.stop();
    assert_eq!(session.state(), PlaybackState::Stopped);

    // Presentation after stop is inert rather than a panic
    let _ = session.update();
}
