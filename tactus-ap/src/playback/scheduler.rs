//! Playback scheduler
//!
//! Drives the decode-ahead policy: pulls buffers from the decode resource,
//! converts them to engine-native form, and submits them to the output
//! engine, re-arming itself from each buffer's completion callback. All
//! decode-and-submit work runs on the serialized lane except the very first
//! buffer of a `start()` call, which decodes synchronously on the caller's
//! thread to minimize startup latency.

use crate::audio::decoder::FrameDecoder;
use crate::audio::output::{CompletionHandler, OutputEngine};
use crate::audio::types::StreamParams;
use crate::error::{Error, Result};
use crate::playback::lane::{LaneHandle, SerialLane};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use tactus_common::{EventTx, PlaybackEvent};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Decode-ahead thresholds for one stream, in sample frames.
///
/// Selected once per stream by tiering the effective sample rate
/// (sample rate × channel count). Denser streams cost more per decoded
/// second, so the immediate buffer shrinks with density to keep startup
/// and seek latency flat, while the deferred window stays wide enough to
/// ride out decode stalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeAheadPolicy {
    /// First buffer: decoded synchronously for instant playback start
    pub immediate_threshold: usize,
    /// Steady-state buffers decoded ahead on the lane
    pub deferred_threshold: usize,
}

impl DecodeAheadPolicy {
    /// Select thresholds for a stream.
    pub fn for_stream(sample_rate: u32, channels: u16) -> Self {
        let effective = sample_rate as u64 * channels as u64;
        let rate = sample_rate as usize;

        let (immediate_secs, deferred_secs) = if effective < 100_000 {
            (5, 10)
        } else if effective < 500_000 {
            (3, 10)
        } else {
            (2, 7)
        };

        Self {
            immediate_threshold: immediate_secs * rate,
            deferred_threshold: deferred_secs * rate,
        }
    }
}

/// Scheduler lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No scheduling in progress
    Idle,
    /// Buffers are being decoded and submitted
    Scheduling,
    /// `stop()` is cancelling queued work and waiting for in-flight work
    Draining,
    /// End of stream reached and all buffers played; terminal until
    /// `initialize` binds a new stream
    Completed,
}

/// Commands executed on the serialized lane.
enum LaneCommand {
    Schedule { max_samples: usize },
}

/// Parameters of the currently bound stream.
struct StreamMeta {
    stream_id: Uuid,
    params: StreamParams,
    policy: DecodeAheadPolicy,
}

struct SchedulerCore {
    engine: Arc<dyn OutputEngine>,
    event_tx: EventTx,
    state: Mutex<SchedulerState>,
    decoder: Mutex<Option<Box<dyn FrameDecoder>>>,
    meta: Mutex<Option<StreamMeta>>,
    /// Buffers submitted to the engine but not yet reported complete.
    /// Mutated from the lane and from the engine's completion context.
    outstanding: AtomicUsize,
    /// Monotonic false → true per stream instance
    end_of_stream: AtomicBool,
    /// Guards the exactly-once completion signal
    completion_fired: AtomicBool,
    /// Set once after lane construction
    lane: OnceLock<LaneHandle<LaneCommand>>,
}

impl SchedulerCore {
    /// Enqueue a scheduling cycle onto the serialized lane.
    fn submit_schedule(&self, max_samples: usize) {
        if let Some(lane) = self.lane.get() {
            lane.submit(LaneCommand::Schedule { max_samples });
        }
    }

    /// Decode up to `max_samples`, convert, and submit one buffer.
    ///
    /// Runs on the lane, or on the caller's thread for the first buffer of
    /// a `start()`. Decode errors are soft: the cycle ends with no buffer
    /// and playback rides on whatever is already outstanding.
    fn schedule_one(core: &Arc<Self>, max_samples: usize) {
        {
            let state = core.state.lock().unwrap();
            if *state != SchedulerState::Scheduling {
                debug!("Skipping scheduling cycle in {:?} state", *state);
                return;
            }
        }

        let mut decoder_guard = core.decoder.lock().unwrap();
        let Some(decoder) = decoder_guard.as_mut() else {
            return;
        };

        match decoder.decode(max_samples) {
            Ok(Some(mut frame)) => {
                if decoder.end_of_stream() {
                    core.end_of_stream.store(true, Ordering::SeqCst);
                }

                let buffer = match frame.to_engine_buffer() {
                    Ok(buffer) => buffer,
                    Err(e) => {
                        warn!("Buffer conversion failed: {}", e);
                        frame.release();
                        core.maybe_finish();
                        return;
                    }
                };
                // The owned frame is a transient intermediary; release it
                // as soon as the engine-native copy exists.
                frame.release();

                let frames = buffer.frame_count();
                core.outstanding.fetch_add(1, Ordering::SeqCst);

                let weak = Arc::downgrade(core);
                let on_complete: CompletionHandler = Box::new(move || {
                    if let Some(core) = weak.upgrade() {
                        SchedulerCore::on_buffer_complete(&core);
                    }
                });

                match core.engine.schedule_buffer(buffer, on_complete) {
                    Ok(()) => {
                        debug!(
                            "Submitted buffer: {} frames, outstanding={}",
                            frames,
                            core.outstanding.load(Ordering::SeqCst)
                        );
                    }
                    Err(e) => {
                        core.outstanding.fetch_sub(1, Ordering::SeqCst);
                        warn!("Buffer submission failed: {}", e);
                        core.maybe_finish();
                    }
                }
            }
            Ok(None) => {
                if decoder.end_of_stream() {
                    core.end_of_stream.store(true, Ordering::SeqCst);
                    drop(decoder_guard);
                    core.maybe_finish();
                } else {
                    debug!("Decode produced no samples this cycle");
                }
            }
            Err(e) => {
                // Soft failure: log, emit, and let the next cycle retry
                warn!("Decode failed (playback continues): {}", e);
                if let Some(meta) = core.meta.lock().unwrap().as_ref() {
                    let _ = core.event_tx.send(PlaybackEvent::DecodeFailed {
                        stream_id: meta.stream_id,
                        detail: e.to_string(),
                    });
                }
            }
        }
    }

    /// Invoked from the engine's completion context for every buffer.
    ///
    /// Must not decode inline; the next cycle is handed back to the lane.
    fn on_buffer_complete(core: &Arc<Self>) {
        // Stale completions from before a stop/restart decrement nothing
        let previous = core
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        let outstanding = previous.saturating_sub(1);
        debug!("Buffer complete, outstanding={}", outstanding);

        let state = *core.state.lock().unwrap();
        if state != SchedulerState::Scheduling {
            return;
        }

        if core.end_of_stream.load(Ordering::SeqCst) {
            if outstanding == 0 {
                core.finish_stream();
            }
        } else if core.engine.is_playing() {
            let deferred = core
                .meta
                .lock()
                .unwrap()
                .as_ref()
                .map(|meta| meta.policy.deferred_threshold);
            if let Some(max_samples) = deferred {
                core.submit_schedule(max_samples);
            }
        }
    }

    /// Fire the completion path if the stream just ran dry.
    fn maybe_finish(&self) {
        if self.end_of_stream.load(Ordering::SeqCst)
            && self.outstanding.load(Ordering::SeqCst) == 0
        {
            self.finish_stream();
        }
    }

    /// Exactly-once completion: mark the state machine terminal, notify the
    /// engine, and deliver the completion signal to the event channel.
    fn finish_stream(&self) {
        if self.completion_fired.swap(true, Ordering::SeqCst) {
            return;
        }

        *self.state.lock().unwrap() = SchedulerState::Completed;
        self.engine.playback_completed();

        let stream_id = self.meta.lock().unwrap().as_ref().map(|m| m.stream_id);
        if let Some(stream_id) = stream_id {
            info!("Stream completed: {}", stream_id);
            let _ = self
                .event_tx
                .send(PlaybackEvent::StreamCompleted { stream_id });
        }
    }
}

/// Playback scheduler.
///
/// Owns the serialized scheduling lane and the decode resource of the
/// currently bound stream. One scheduler instance is reused across streams
/// via [`initialize`](Self::initialize).
pub struct Scheduler {
    core: Arc<SchedulerCore>,
    lane: SerialLane<LaneCommand>,
}

impl Scheduler {
    /// Create a scheduler bound to an output engine and an event channel.
    ///
    /// The event channel is the designated destination for the completion
    /// signal; its receiver decides the consuming execution context.
    pub fn new(engine: Arc<dyn OutputEngine>, event_tx: EventTx) -> Self {
        let core = Arc::new(SchedulerCore {
            engine,
            event_tx,
            state: Mutex::new(SchedulerState::Idle),
            decoder: Mutex::new(None),
            meta: Mutex::new(None),
            outstanding: AtomicUsize::new(0),
            end_of_stream: AtomicBool::new(false),
            completion_fired: AtomicBool::new(false),
            lane: OnceLock::new(),
        });

        let worker_core = Arc::clone(&core);
        let lane = SerialLane::spawn("scheduler", move |command| match command {
            LaneCommand::Schedule { max_samples } => {
                SchedulerCore::schedule_one(&worker_core, max_samples);
            }
        });

        let _ = core.lane.set(lane.handle());

        Self { core, lane }
    }

    /// Bind a new stream: compute thresholds from its parameters and reset
    /// per-stream state.
    ///
    /// Replaces any previously bound decode resource (which is destroyed).
    ///
    /// # Errors
    /// - `InvalidState` unless the scheduler is `Idle` or `Completed`
    pub fn initialize(
        &self,
        decoder: Box<dyn FrameDecoder>,
        params: StreamParams,
    ) -> Result<Uuid> {
        {
            let mut state = self.core.state.lock().unwrap();
            match *state {
                SchedulerState::Idle | SchedulerState::Completed => {}
                other => {
                    return Err(Error::InvalidState(format!(
                        "initialize called while {:?}",
                        other
                    )))
                }
            }
            *state = SchedulerState::Idle;
        }

        let policy = DecodeAheadPolicy::for_stream(params.sample_rate, params.channels);
        let stream_id = Uuid::new_v4();

        info!(
            "Scheduler initialized: stream={}, {}Hz x {}ch, immediate={} samples, deferred={} samples",
            stream_id,
            params.sample_rate,
            params.channels,
            policy.immediate_threshold,
            policy.deferred_threshold
        );

        // Dropping the old decode resource destroys it
        *self.core.decoder.lock().unwrap() = Some(decoder);
        *self.core.meta.lock().unwrap() = Some(StreamMeta {
            stream_id,
            params,
            policy,
        });
        self.core.outstanding.store(0, Ordering::SeqCst);
        self.core.end_of_stream.store(false, Ordering::SeqCst);
        self.core.completion_fired.store(false, Ordering::SeqCst);

        Ok(stream_id)
    }

    /// Begin scheduling, optionally seeking first.
    ///
    /// Decodes and submits one buffer of `immediate_threshold` samples
    /// synchronously on the caller's thread, then enqueues the first
    /// `deferred_threshold` cycle onto the lane. A seek failure fails the
    /// whole call and leaves the scheduler idle.
    ///
    /// # Errors
    /// - `InvalidState` unless the scheduler is `Idle` with a bound stream
    /// - `Seek` if the requested seek fails
    pub fn start(&self, seek_position: Option<f64>) -> Result<()> {
        {
            let state = self.core.state.lock().unwrap();
            if *state != SchedulerState::Idle {
                return Err(Error::InvalidState(format!(
                    "start called while {:?}",
                    *state
                )));
            }
        }

        let (stream_id, sample_rate, channels, policy) = {
            let meta = self.core.meta.lock().unwrap();
            let meta = meta
                .as_ref()
                .ok_or_else(|| Error::InvalidState("no stream bound".to_string()))?;
            (
                meta.stream_id,
                meta.params.sample_rate,
                meta.params.channels,
                meta.policy,
            )
        };

        if let Some(seconds) = seek_position {
            let mut decoder = self.core.decoder.lock().unwrap();
            let decoder = decoder
                .as_mut()
                .ok_or_else(|| Error::InvalidState("no stream bound".to_string()))?;
            decoder.seek_to_time(seconds)?;
            info!("Seeked to {:.3}s before scheduling", seconds);
        }

        self.core.outstanding.store(0, Ordering::SeqCst);
        self.core.end_of_stream.store(false, Ordering::SeqCst);
        *self.core.state.lock().unwrap() = SchedulerState::Scheduling;

        let _ = self.core.event_tx.send(PlaybackEvent::PlaybackStarted {
            stream_id,
            sample_rate,
            channels,
        });

        // Low-latency first buffer on the caller's thread
        SchedulerCore::schedule_one(&self.core, policy.immediate_threshold);

        // Steady-state decode-ahead on the serialized lane
        self.core.submit_schedule(policy.deferred_threshold);

        Ok(())
    }

    /// Cancel queued scheduling work and block until in-flight work ends.
    ///
    /// After this returns, no buffer submission queued before the call will
    /// occur. No-op unless the scheduler is actively scheduling.
    pub fn stop(&self) {
        {
            let mut state = self.core.state.lock().unwrap();
            if *state != SchedulerState::Scheduling {
                debug!("stop() with no active scheduling ({:?})", *state);
                return;
            }
            *state = SchedulerState::Draining;
        }

        self.lane.cancel_and_drain();

        {
            let mut state = self.core.state.lock().unwrap();
            if *state == SchedulerState::Draining {
                *state = SchedulerState::Idle;
            }
        }
        info!("Scheduler stopped");
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        *self.core.state.lock().unwrap()
    }

    /// Buffers submitted but not yet reported complete.
    pub fn outstanding(&self) -> usize {
        self.core.outstanding.load(Ordering::SeqCst)
    }

    /// True once the bound stream's end has been observed.
    pub fn end_of_stream(&self) -> bool {
        self.core.end_of_stream.load(Ordering::SeqCst)
    }
}
