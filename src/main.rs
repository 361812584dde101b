use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use reelplayer::media::FfmpegPipeline;
use reelplayer::{
    format_time, MediaPipeline, PlaybackSession, PlayerConfig, PlayerEvent, SessionOptions,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// reelplayer - console audio/video playback engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Media file to play
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Start position in seconds
    #[arg(short, long, value_name = "SECONDS")]
    start: Option<f64>,

    /// Audio track index to play
    #[arg(short = 't', long, value_name = "INDEX")]
    audio_track: Option<usize>,

    /// SRT subtitle sidecar to display
    #[arg(long, value_name = "FILE")]
    subs: Option<PathBuf>,

    /// Disable audio output
    #[arg(long)]
    no_audio: bool,

    /// Print stream information as JSON and exit
    #[arg(long)]
    probe: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = PlayerConfig::load_with(args.config.as_deref())?;
    let log_level = if args.debug {
        "debug"
    } else {
        &config.general.log_level
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    info!("Starting reelplayer v{}", env!("CARGO_PKG_VERSION"));

    if !args.file.exists() {
        error!("File not found: {:?}", args.file);
        return Err(anyhow::anyhow!("File not found"));
    }

    if args.probe {
        return probe(&args.file, &config);
    }
    play(&args, &config)
}

/// Print container and stream information as JSON
fn probe(path: &Path, config: &PlayerConfig) -> Result<()> {
    let pipeline = FfmpegPipeline::open(path, config)?;
    println!("{}", serde_json::to_string_pretty(pipeline.info())?);
    Ok(())
}

fn play(args: &Args, config: &PlayerConfig) -> Result<()> {
    let options = SessionOptions {
        no_audio: args.no_audio,
        start_secs: args.start,
        audio_track: args.audio_track,
        subtitle_path: args.subs.clone(),
    };
    let mut session = PlaybackSession::open_with(&args.file, config, options)?;

    for (index, track) in session.list_audio_tracks().iter().enumerate() {
        info!(
            "Audio track {}: {} {} Hz {} ch [{}]",
            index,
            track.codec,
            track.sample_rate,
            track.channels,
            track.language.as_deref().unwrap_or("und")
        );
    }

    session.play();

    let mut frames_presented: u64 = 0;
    let mut last_progress = Instant::now();
    loop {
        if session.update().is_some() {
            // Headless surface: the frame is accounted for and released
            frames_presented += 1;
        }

        for event in session.events().try_iter() {
            match event {
                PlayerEvent::Error(message) => error!("Player error: {}", message),
                PlayerEvent::TrackSwitched(track) => info!("Audio track now {}", track),
                _ => {}
            }
        }

        if last_progress.elapsed() >= Duration::from_millis(250) {
            print_progress(&session, frames_presented)?;
            last_progress = Instant::now();
        }

        if !session.state().is_active() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }

    print_progress(&session, frames_presented)?;
    println!();
    info!(
        "Stopped at {} after {} frames",
        format_time(session.current_time()),
        frames_presented
    );
    session.stop();
    Ok(())
}

fn print_progress(session: &PlaybackSession, frames_presented: u64) -> Result<()> {
    let snapshot = session.snapshot();
    let subtitle = snapshot
        .subtitle
        .as_deref()
        .and_then(|text| text.lines().next())
        .unwrap_or("");
    print!(
        "\r[{}] {} / {}  frames: {}  dropped: {}  {:<40}",
        snapshot.state,
        format_time(snapshot.position_secs),
        format_time(snapshot.duration_secs),
        frames_presented,
        snapshot.frames_dropped,
        subtitle
    );
    std::io::stdout().flush()?;
    Ok(())
}
