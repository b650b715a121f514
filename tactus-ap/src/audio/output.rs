//! Audio output using cpal
//!
//! [`OutputEngine`] is the interface the scheduler submits buffers to;
//! [`CpalOutput`] implements it on top of a cpal device stream. Scheduled
//! buffers queue in FIFO order and the audio callback drains them,
//! invoking each buffer's completion handler from the audio thread as the
//! buffer empties. Completion handlers must be cheap and non-blocking;
//! the scheduler's handlers only post a message back to its lane.

use crate::audio::types::EngineBuffer;
use crate::error::{Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Callback invoked by the output engine when a scheduled buffer finishes
/// playing. Runs on the engine's own execution context.
pub type CompletionHandler = Box<dyn FnOnce() + Send>;

/// Audio output engine interface consumed by the scheduler.
pub trait OutputEngine: Send + Sync {
    /// Queue a buffer for playback; `on_complete` fires once it has played.
    fn schedule_buffer(&self, buffer: EngineBuffer, on_complete: CompletionHandler) -> Result<()>;

    /// True while the output stream is running.
    fn is_playing(&self) -> bool;

    /// Lifecycle hook invoked once by the scheduler when stream completion
    /// is detected.
    fn playback_completed(&self);
}

/// One queued buffer with its drain position and completion handler.
struct ScheduledBuffer {
    samples: Vec<f32>,
    channels: u16,
    pos: usize,
    on_complete: Option<CompletionHandler>,
}

/// State shared between the control side and the audio thread.
struct OutputShared {
    queue: Mutex<VecDeque<ScheduledBuffer>>,
    volume: Mutex<f32>,
    playing: AtomicBool,
    stopped: AtomicBool,
    /// Set by the audio callback's error handler
    error_flag: AtomicBool,
}

/// Audio output manager using cpal.
///
/// The cpal stream itself is owned by a dedicated audio thread (streams are
/// not `Send`); this handle carries only thread-safe state and can be
/// shared as an `Arc<dyn OutputEngine>`.
pub struct CpalOutput {
    device: Mutex<Device>,
    config: StreamConfig,
    sample_format: SampleFormat,
    shared: Arc<OutputShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CpalOutput {
    /// List available audio output device names.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();

        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
            .filter_map(|device| device.name().ok())
            .collect();

        debug!("Found {} output devices", devices.len());
        Ok(devices)
    }

    /// Open an audio device for output.
    ///
    /// Falls back to the default device if the requested one is missing.
    ///
    /// # Arguments
    /// - `device_name`: Optional device name (None = default device)
    /// - `sample_rate`: Preferred stream sample rate
    /// - `buffer_size`: Optional device buffer size in frames
    pub fn new(
        device_name: Option<String>,
        sample_rate: u32,
        buffer_size: Option<u32>,
    ) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name.as_ref() {
            let mut devices = host
                .output_devices()
                .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

            match devices.find(|d| d.name().ok().as_ref() == Some(name)) {
                Some(dev) => {
                    info!("Found requested audio device: {}", name);
                    dev
                }
                None => {
                    warn!(
                        "Requested device '{}' not found, falling back to default device",
                        name
                    );
                    host.default_output_device().ok_or_else(|| {
                        Error::AudioOutput(format!(
                            "Device '{}' not found and no default device available",
                            name
                        ))
                    })?
                }
            }
        } else {
            host.default_output_device()
                .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?
        };

        let (mut config, sample_format) = Self::get_best_config(&device, sample_rate)?;

        if let Some(size) = buffer_size {
            config.buffer_size = cpal::BufferSize::Fixed(size);
            debug!("Using requested buffer size: {} frames", size);
        }

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, buffer_size={:?}",
            config.sample_rate.0, config.channels, sample_format, config.buffer_size
        );

        Ok(Self {
            device: Mutex::new(device),
            config,
            sample_format,
            shared: Arc::new(OutputShared {
                queue: Mutex::new(VecDeque::new()),
                volume: Mutex::new(1.0),
                playing: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                error_flag: AtomicBool::new(false),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Pick the best supported configuration for playback.
    ///
    /// Prefers stereo f32 at the requested rate, falling back to the device
    /// default.
    fn get_best_config(device: &Device, sample_rate: u32) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported_configs = device
            .supported_output_configs()
            .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?;

        let preferred = supported_configs.find(|config| {
            config.channels() == 2
                && config.min_sample_rate().0 <= sample_rate
                && config.max_sample_rate().0 >= sample_rate
                && config.sample_format() == SampleFormat::F32
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(sample_rate))
                .config();
            return Ok((config, sample_format));
        }

        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get default config: {}", e)))?;

        let sample_format = supported_config.sample_format();
        Ok((supported_config.config(), sample_format))
    }

    /// Start the output stream on its own audio thread.
    ///
    /// Blocks until the stream is running or its construction failed.
    pub fn start(&self) -> Result<()> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput("output engine is stopped".to_string()));
        }
        if self.shared.playing.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput("output stream already running".to_string()));
        }

        info!("Starting audio stream");

        let device = self.device.lock().unwrap().clone();
        let config = self.config.clone();
        let sample_format = self.sample_format;
        let shared = Arc::clone(&self.shared);
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<()>>();

        let handle = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let stream = match Self::build_stream(&device, &config, sample_format, &shared) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(Error::AudioOutput(format!(
                        "Failed to start stream: {}",
                        e
                    ))));
                    return;
                }

                shared.playing.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));

                while !shared.stopped.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(50));
                }

                drop(stream);
                shared.playing.store(false, Ordering::SeqCst);
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn audio thread: {}", e)))?;

        *self.worker.lock().unwrap() = Some(handle);

        ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("audio thread exited during startup".to_string()))??;

        info!("Audio stream started successfully");
        Ok(())
    }

    fn build_stream(
        device: &Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        shared: &Arc<OutputShared>,
    ) -> Result<cpal::Stream> {
        match sample_format {
            SampleFormat::F32 => Self::build_stream_f32(device, config, shared),
            SampleFormat::I16 => Self::build_stream_i16(device, config, shared),
            other => Err(Error::AudioOutput(format!(
                "Unsupported sample format: {:?}",
                other
            ))),
        }
    }

    fn build_stream_f32(
        device: &Device,
        config: &StreamConfig,
        shared: &Arc<OutputShared>,
    ) -> Result<cpal::Stream> {
        let channels = config.channels as usize;
        let data_shared = Arc::clone(shared);
        let error_shared = Arc::clone(shared);
        let mut frame = vec![0.0f32; channels];

        device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let volume = *data_shared.volume.lock().unwrap();
                    let mut completed = Vec::new();
                    {
                        let mut queue = data_shared.queue.lock().unwrap();
                        for out in data.chunks_mut(channels) {
                            Self::render_frame(&mut queue, &mut completed, &mut frame);
                            for (dst, src) in out.iter_mut().zip(frame.iter()) {
                                *dst = (*src * volume).clamp(-1.0, 1.0);
                            }
                        }
                    }
                    for on_complete in completed {
                        on_complete();
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_shared.error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    fn build_stream_i16(
        device: &Device,
        config: &StreamConfig,
        shared: &Arc<OutputShared>,
    ) -> Result<cpal::Stream> {
        let channels = config.channels as usize;
        let data_shared = Arc::clone(shared);
        let error_shared = Arc::clone(shared);
        let mut frame = vec![0.0f32; channels];

        device
            .build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let volume = *data_shared.volume.lock().unwrap();
                    let mut completed = Vec::new();
                    {
                        let mut queue = data_shared.queue.lock().unwrap();
                        for out in data.chunks_mut(channels) {
                            Self::render_frame(&mut queue, &mut completed, &mut frame);
                            for (dst, src) in out.iter_mut().zip(frame.iter()) {
                                let sample = (*src * volume).clamp(-1.0, 1.0);
                                *dst = (sample * i16::MAX as f32) as i16;
                            }
                        }
                    }
                    for on_complete in completed {
                        on_complete();
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_shared.error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
    }

    /// Fill one output frame from the scheduled-buffer queue.
    ///
    /// Pops drained buffers, collecting their completion handlers for
    /// invocation after the queue lock is released. Writes silence on
    /// underrun. Mono sources are duplicated across outputs; sources wider
    /// than the device map their leading channels.
    fn render_frame(
        queue: &mut VecDeque<ScheduledBuffer>,
        completed: &mut Vec<CompletionHandler>,
        out: &mut [f32],
    ) {
        loop {
            let Some(front) = queue.front_mut() else {
                out.fill(0.0);
                return;
            };

            let src_channels = front.channels as usize;
            if front.pos + src_channels <= front.samples.len() {
                let src = &front.samples[front.pos..front.pos + src_channels];
                for (idx, dst) in out.iter_mut().enumerate() {
                    *dst = if src_channels == 1 {
                        src[0]
                    } else {
                        *src.get(idx).unwrap_or(&0.0)
                    };
                }
                front.pos += src_channels;
                return;
            }

            // Buffer drained; fire completion and move to the next
            let mut done = queue.pop_front().unwrap();
            if let Some(on_complete) = done.on_complete.take() {
                completed.push(on_complete);
            }
        }
    }

    /// Stop the output stream and join the audio thread.
    pub fn stop(&self) -> Result<()> {
        info!("Stopping audio stream");
        self.shared.stopped.store(true, Ordering::SeqCst);

        let handle = self.worker.lock().unwrap().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| Error::AudioOutput("audio thread panicked".to_string()))?;
        }
        Ok(())
    }

    /// Set output volume, clamped to [0.0, 1.0].
    pub fn set_volume(&self, volume: f32) {
        let clamped = volume.clamp(0.0, 1.0);
        *self.shared.volume.lock().unwrap() = clamped;
        debug!("Volume set to {:.2}", clamped);
    }

    /// Get current volume.
    pub fn get_volume(&self) -> f32 {
        *self.shared.volume.lock().unwrap()
    }

    /// Negotiated stream sample rate.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Negotiated channel count.
    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// True if the audio callback has flagged a stream error.
    pub fn has_error(&self) -> bool {
        self.shared.error_flag.load(Ordering::SeqCst)
    }
}

impl OutputEngine for CpalOutput {
    fn schedule_buffer(&self, buffer: EngineBuffer, on_complete: CompletionHandler) -> Result<()> {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput("output engine is stopped".to_string()));
        }

        debug!(
            "Scheduling buffer: {} frames ({} ms)",
            buffer.frame_count(),
            buffer.duration_ms()
        );

        self.shared
            .queue
            .lock()
            .unwrap()
            .push_back(ScheduledBuffer {
                samples: buffer.samples,
                channels: buffer.channels,
                pos: 0,
                on_complete: Some(on_complete),
            });
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::SeqCst)
    }

    fn playback_completed(&self) {
        let remaining = self.shared.queue.lock().unwrap().len();
        info!(
            "Playback completed ({} buffers still queued)",
            remaining
        );
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        // Ensure the stream thread is torn down on drop
        let _ = self.stop();
    }
}
