//! Shared test helpers: mock decoder, mock output engine, WAV fixtures
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tactus_ap::audio::{
    BufferedFrame, ChannelLayout, CompletionHandler, EngineBuffer, FrameDecoder, FrameView,
    OutputEngine, SampleFormat, StreamParams,
};
use tactus_ap::error::{Error, Result};
use tactus_common::TimeBase;

/// Poll `predicate` until it holds or `deadline_ms` elapses.
pub fn wait_until(deadline_ms: u64, predicate: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    predicate()
}

/// Stream parameters for a mock stereo stream.
pub fn mock_params(sample_rate: u32) -> StreamParams {
    StreamParams {
        sample_rate,
        channels: 2,
        channel_layout: ChannelLayout::STEREO,
        format: SampleFormat::F32Planar,
        time_base: TimeBase::from_sample_rate(sample_rate),
    }
}

/// Deterministic in-memory decoder.
///
/// Produces planar-f32 stereo frames whose sample values equal their
/// absolute frame index, so tests can verify exactly which part of the
/// stream a buffer came from. Timestamps are the starting frame index.
pub struct MockFrameDecoder {
    position: usize,
    total_samples: usize,
    sample_rate: u32,
    eos: bool,
    decode_delay: Duration,
    fail_next_decode: Arc<AtomicBool>,
    fail_seeks: bool,
    requests: Arc<Mutex<Vec<usize>>>,
    seeks: Arc<Mutex<Vec<f64>>>,
}

impl MockFrameDecoder {
    pub fn new(sample_rate: u32, total_samples: usize) -> Self {
        Self {
            position: 0,
            total_samples,
            sample_rate,
            eos: false,
            decode_delay: Duration::ZERO,
            fail_next_decode: Arc::new(AtomicBool::new(false)),
            fail_seeks: false,
            requests: Arc::new(Mutex::new(Vec::new())),
            seeks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make every decode call sleep, to keep the lane busy in tests.
    pub fn with_decode_delay(mut self, delay: Duration) -> Self {
        self.decode_delay = delay;
        self
    }

    /// Make every seek fail.
    pub fn with_failing_seeks(mut self) -> Self {
        self.fail_seeks = true;
        self
    }

    /// Flag shared with tests: set to make the next decode call fail once.
    pub fn fail_next_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_next_decode)
    }

    /// Recorded `max_samples` arguments, in call order.
    pub fn requests_log(&self) -> Arc<Mutex<Vec<usize>>> {
        Arc::clone(&self.requests)
    }

    /// Recorded seek positions, in call order.
    pub fn seeks_log(&self) -> Arc<Mutex<Vec<f64>>> {
        Arc::clone(&self.seeks)
    }
}

impl FrameDecoder for MockFrameDecoder {
    fn decode(&mut self, max_samples: usize) -> Result<Option<BufferedFrame>> {
        self.requests.lock().unwrap().push(max_samples);

        if !self.decode_delay.is_zero() {
            std::thread::sleep(self.decode_delay);
        }

        if self.fail_next_decode.swap(false, Ordering::SeqCst) {
            return Err(Error::Decode("injected decode failure".to_string()));
        }

        if self.position >= self.total_samples {
            self.eos = true;
            return Ok(None);
        }

        let take = max_samples.min(self.total_samples - self.position);
        let left: Vec<u8> = (0..take)
            .flat_map(|i| ((self.position + i) as f32).to_ne_bytes())
            .collect();
        let right = left.clone();
        let planes: Vec<&[u8]> = vec![&left, &right];

        let view = FrameView {
            timestamp: self.position as i64,
            channel_layout: ChannelLayout::STEREO,
            channels: 2,
            samples: take,
            sample_rate: self.sample_rate,
            line_size: take * 4,
            format: SampleFormat::F32Planar,
            planes: &planes,
        };
        let frame = BufferedFrame::copy_from(&view)?;

        self.position += take;
        if self.position >= self.total_samples {
            self.eos = true;
        }

        Ok(Some(frame))
    }

    fn seek_to_time(&mut self, seconds: f64) -> Result<()> {
        if self.fail_seeks {
            return Err(Error::Seek("injected seek failure".to_string()));
        }
        self.seeks.lock().unwrap().push(seconds);
        self.position = (seconds * self.sample_rate as f64) as usize;
        self.eos = self.position >= self.total_samples;
        Ok(())
    }

    fn end_of_stream(&self) -> bool {
        self.eos
    }
}

/// Record of one buffer submitted to the mock engine.
#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub frames: usize,
    pub channels: u16,
    pub first_sample: f32,
}

struct MockEngineInner {
    scheduled: Vec<BufferRecord>,
    pending: VecDeque<CompletionHandler>,
}

/// Output engine double: records submissions, fires completions on demand.
pub struct MockEngine {
    inner: Mutex<MockEngineInner>,
    playing: AtomicBool,
    completed_calls: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(MockEngineInner {
                scheduled: Vec::new(),
                pending: VecDeque::new(),
            }),
            playing: AtomicBool::new(true),
            completed_calls: AtomicUsize::new(0),
        })
    }

    pub fn scheduled_count(&self) -> usize {
        self.inner.lock().unwrap().scheduled.len()
    }

    pub fn scheduled(&self) -> Vec<BufferRecord> {
        self.inner.lock().unwrap().scheduled.clone()
    }

    /// Fire the oldest pending completion on the caller's thread,
    /// simulating the engine's own completion context.
    pub fn complete_one(&self) -> bool {
        let handler = self.inner.lock().unwrap().pending.pop_front();
        match handler {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }

    pub fn pending_completions(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    pub fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::SeqCst);
    }

    pub fn playback_completed_calls(&self) -> usize {
        self.completed_calls.load(Ordering::SeqCst)
    }
}

impl OutputEngine for MockEngine {
    fn schedule_buffer(&self, buffer: EngineBuffer, on_complete: CompletionHandler) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.scheduled.push(BufferRecord {
            frames: buffer.frame_count(),
            channels: buffer.channels,
            first_sample: buffer.samples.first().copied().unwrap_or(f32::NAN),
        });
        inner.pending.push_back(on_complete);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    fn playback_completed(&self) {
        self.completed_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Write a stereo 16-bit WAV whose left channel is a ramp of frame indices
/// (mod 10000) and right channel its negation. Returns the file path.
pub fn write_ramp_wav(dir: &std::path::Path, frames: u32, sample_rate: u32) -> PathBuf {
    let path = dir.join("fixture.wav");
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(&path, spec).unwrap();
    for i in 0..frames {
        let value = (i % 10_000) as i16;
        writer.write_sample(value).unwrap();
        writer.write_sample(-value).unwrap();
    }
    writer.finalize().unwrap();

    path
}

/// Expected f32 value of the ramp fixture's left channel at `frame`.
pub fn ramp_value(frame: u32) -> f32 {
    (frame % 10_000) as i16 as f32 / i16::MAX as f32
}
