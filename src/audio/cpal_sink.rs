//! cpal-backed audio sink
//!
//! Samples flow through a lock-free SPSC ring: the decode thread pushes on
//! one side, the device callback pops on the other. The cpal stream is not
//! `Send`, so it is built and kept on a dedicated thread that parks until
//! the sink shuts down; control crosses over via atomics.

use crate::audio::AudioSink;
use crate::media::AudioChunk;
use crate::utils::config::AudioConfig;
use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Audio sink playing through the default cpal output device
pub struct CpalSink {
    producer: Mutex<HeapProd<f32>>,
    shared: Arc<SinkShared>,
    control: Mutex<SinkControl>,
    sample_rate: u32,
    channels: u16,
    bytes_per_second: usize,
}

/// State shared with the device callback
struct SinkShared {
    paused: AtomicBool,
    clear_requested: AtomicBool,
    volume_bits: AtomicU32,
    underruns: AtomicU64,
}

struct SinkControl {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

/// Format the device actually agreed to
#[derive(Debug, Clone, Copy)]
struct NegotiatedFormat {
    sample_rate: u32,
    channels: u16,
}

impl CpalSink {
    /// Open the default output device
    ///
    /// `ring_bytes` sizes the sample ring; it should comfortably exceed the
    /// decode loop's backlog limit so pushes rarely truncate. The sink
    /// starts paused, matching the initial session state.
    pub fn new(config: &AudioConfig, ring_bytes: usize) -> Result<Self> {
        let ring = HeapRb::<f32>::new(ring_capacity_samples(ring_bytes));
        let (producer, consumer) = ring.split();

        let shared = Arc::new(SinkShared {
            paused: AtomicBool::new(true),
            clear_requested: AtomicBool::new(false),
            volume_bits: AtomicU32::new(config.volume.clamp(0.0, 1.0).to_bits()),
            underruns: AtomicU64::new(0),
        });

        let (ready_tx, ready_rx) = bounded(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);

        let desired_rate = config.sample_rate;
        let desired_channels = config.channels;
        let thread_shared = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name("audio-out".to_string())
            .spawn(move || {
                stream_thread(
                    consumer,
                    thread_shared,
                    desired_rate,
                    desired_channels,
                    ready_tx,
                    shutdown_rx,
                );
            })?;

        let format = match ready_rx.recv() {
            Ok(Ok(format)) => format,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                return Err(PlayerError::Audio(
                    "audio thread exited during setup".to_string(),
                ));
            }
        };

        if format.sample_rate != desired_rate || format.channels != desired_channels {
            warn!(
                "Audio device negotiated {} Hz / {} ch (requested {} Hz / {} ch)",
                format.sample_rate, format.channels, desired_rate, desired_channels
            );
        }
        info!(
            "Audio output ready: {} Hz, {} channels",
            format.sample_rate, format.channels
        );

        Ok(Self {
            producer: Mutex::new(producer),
            shared,
            control: Mutex::new(SinkControl {
                shutdown: Some(shutdown_tx),
                thread: Some(thread),
            }),
            sample_rate: format.sample_rate,
            channels: format.channels,
            bytes_per_second: format.sample_rate as usize
                * format.channels as usize
                * std::mem::size_of::<f32>(),
        })
    }

    /// Sample rate the device settled on
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count the device settled on
    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn set_volume(&self, volume: f32) {
        self.shared
            .volume_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }
}

impl AudioSink for CpalSink {
    fn queue_chunk(&self, chunk: &AudioChunk) -> Result<()> {
        let mut producer = self.producer.lock();
        let written = producer.push_slice(&chunk.samples);
        if written < chunk.samples.len() {
            debug!(
                "Audio ring full, dropped {} samples",
                chunk.samples.len() - written
            );
        }
        Ok(())
    }

    fn queued_bytes(&self) -> usize {
        self.producer.lock().occupied_len() * std::mem::size_of::<f32>()
    }

    fn bytes_per_second(&self) -> usize {
        self.bytes_per_second
    }

    fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::Relaxed);
    }

    fn clear(&self) {
        // The callback owns the consumer; it honors the flag within one
        // device period.
        self.shared.clear_requested.store(true, Ordering::Release);
    }

    fn stop(&self) {
        let mut control = self.control.lock();
        if let Some(shutdown) = control.shutdown.take() {
            drop(shutdown);
        }
        if let Some(thread) = control.thread.take() {
            let _ = thread.join();
        }
    }

    fn is_realtime(&self) -> bool {
        true
    }

    fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the audio thread: build the stream, then park until shutdown
fn stream_thread(
    consumer: HeapCons<f32>,
    shared: Arc<SinkShared>,
    desired_rate: u32,
    desired_channels: u16,
    ready: Sender<Result<NegotiatedFormat>>,
    shutdown: Receiver<()>,
) {
    match build_stream(consumer, shared, desired_rate, desired_channels) {
        Ok((stream, format)) => {
            if ready.send(Ok(format)).is_err() {
                return;
            }
            // Keeps the stream alive; unblocks when the sender is dropped
            let _ = shutdown.recv();
            drop(stream);
            debug!("Audio output stream closed");
        }
        Err(e) => {
            let _ = ready.send(Err(e));
        }
    }
}

fn build_stream(
    mut consumer: HeapCons<f32>,
    shared: Arc<SinkShared>,
    desired_rate: u32,
    desired_channels: u16,
) -> Result<(cpal::Stream, NegotiatedFormat)> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| PlayerError::Audio("No audio output device available".to_string()))?;
    debug!(
        "Using audio device: {}",
        device.name().unwrap_or_else(|_| "unknown".to_string())
    );

    let stream_config = negotiate_config(&device, desired_rate, desired_channels)?;
    let format = NegotiatedFormat {
        sample_rate: stream_config.sample_rate.0,
        channels: stream_config.channels,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if shared.clear_requested.swap(false, Ordering::AcqRel) {
                    consumer.clear();
                }
                if shared.paused.load(Ordering::Relaxed) {
                    data.fill(0.0);
                    return;
                }
                let read = consumer.pop_slice(data);
                let volume = f32::from_bits(shared.volume_bits.load(Ordering::Relaxed));
                for sample in &mut data[..read] {
                    *sample *= volume;
                }
                if read < data.len() {
                    data[read..].fill(0.0);
                    shared.underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| error!("Audio stream error: {}", err),
            None,
        )
        .audio_err("Failed to build output stream")?;

    stream.play().audio_err("Failed to start output stream")?;
    Ok((stream, format))
}

/// Pick an f32 config at the requested rate and channel count, falling back
/// to the device default
fn negotiate_config(
    device: &cpal::Device,
    rate: u32,
    channels: u16,
) -> Result<cpal::StreamConfig> {
    if let Ok(mut ranges) = device.supported_output_configs() {
        if let Some(range) = ranges.find(|r| {
            r.sample_format() == cpal::SampleFormat::F32
                && r.channels() == channels
                && r.min_sample_rate().0 <= rate
                && rate <= r.max_sample_rate().0
        }) {
            return Ok(range.with_sample_rate(cpal::SampleRate(rate)).config());
        }
    }

    let default = device
        .default_output_config()
        .audio_err("No default output config")?;
    if default.sample_format() != cpal::SampleFormat::F32 {
        return Err(PlayerError::Audio(format!(
            "Unsupported device sample format: {:?}",
            default.sample_format()
        )));
    }
    warn!(
        "Falling back to device default audio config: {} Hz / {} ch",
        default.sample_rate().0,
        default.channels()
    );
    Ok(default.config())
}

fn ring_capacity_samples(ring_bytes: usize) -> usize {
    (ring_bytes / std::mem::size_of::<f32>()).max(8192)
}
