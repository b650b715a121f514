//! Buffered frame: independently-owned copies of decoded sample planes
//!
//! A [`BufferedFrame`] deep-copies a transient decoder frame so the decoder
//! can reuse or free its own memory immediately. The copy carries the
//! metadata needed to schedule it (timestamp, layout, format, sample count)
//! and is released exactly once: explicitly via [`BufferedFrame::release`]
//! or implicitly on drop.

use crate::audio::types::{ChannelLayout, EngineBuffer, FrameView, SampleFormat};
use crate::error::{Error, Result};
use std::hash::{Hash, Hasher};

/// Maximum number of sample planes a frame may carry.
pub const MAX_PLANES: usize = 8;

/// Deep, independently-owned copy of one decoded frame's sample planes.
///
/// Equality, ordering, and hashing are derived solely from the timestamp,
/// which is only meaningful between frames of the same stream; callers must
/// not compare frames across streams.
#[derive(Debug)]
pub struct BufferedFrame {
    timestamp: i64,
    channel_layout: ChannelLayout,
    channels: u16,
    samples: usize,
    sample_rate: u32,
    line_size: usize,
    format: SampleFormat,
    planes: Vec<Vec<u8>>,
    released: bool,
}

impl BufferedFrame {
    /// Copy a transient decoder frame into newly allocated storage.
    ///
    /// Copies `line_size` bytes from each of the frame's planes (one plane
    /// if interleaved, one per channel if planar). No reference into the
    /// source frame's memory is retained.
    ///
    /// # Errors
    /// - `Decode` if the plane count exceeds [`MAX_PLANES`], the view
    ///   supplies fewer planes than its format requires, or a plane is
    ///   shorter than `line_size`
    pub fn copy_from(view: &FrameView<'_>) -> Result<Self> {
        let plane_count = view.format.plane_count(view.channels);

        if plane_count > MAX_PLANES {
            return Err(Error::Decode(format!(
                "frame requires {} planes, maximum is {}",
                plane_count, MAX_PLANES
            )));
        }
        if view.planes.len() < plane_count {
            return Err(Error::Decode(format!(
                "frame supplies {} planes, format requires {}",
                view.planes.len(),
                plane_count
            )));
        }

        let mut planes = Vec::with_capacity(plane_count);
        for (idx, plane) in view.planes.iter().take(plane_count).enumerate() {
            if plane.len() < view.line_size {
                return Err(Error::Decode(format!(
                    "plane {} is {} bytes, expected at least {}",
                    idx,
                    plane.len(),
                    view.line_size
                )));
            }
            planes.push(plane[..view.line_size].to_vec());
        }

        Ok(Self {
            timestamp: view.timestamp,
            channel_layout: view.channel_layout,
            channels: view.channels,
            samples: view.samples,
            sample_rate: view.sample_rate,
            line_size: view.line_size,
            format: view.format,
            planes,
            released: false,
        })
    }

    /// Append another decoded frame's planes to this copy.
    ///
    /// Used by the decode resource to aggregate consecutive frames into one
    /// buffer. The view must match this frame's format, channel count, and
    /// sample rate.
    pub fn extend_from(&mut self, view: &FrameView<'_>) -> Result<()> {
        if self.released {
            return Err(Error::InvalidState(
                "cannot extend a released frame".to_string(),
            ));
        }
        if view.format != self.format
            || view.channels != self.channels
            || view.sample_rate != self.sample_rate
        {
            return Err(Error::Decode(format!(
                "frame parameters changed mid-stream: {:?}/{}ch/{}Hz -> {:?}/{}ch/{}Hz",
                self.format,
                self.channels,
                self.sample_rate,
                view.format,
                view.channels,
                view.sample_rate
            )));
        }

        let plane_count = self.planes.len();
        if view.planes.len() < plane_count {
            return Err(Error::Decode(format!(
                "frame supplies {} planes, buffer has {}",
                view.planes.len(),
                plane_count
            )));
        }

        for (plane, src) in self.planes.iter_mut().zip(view.planes.iter()) {
            if src.len() < view.line_size {
                return Err(Error::Decode(format!(
                    "plane is {} bytes, expected at least {}",
                    src.len(),
                    view.line_size
                )));
            }
            plane.extend_from_slice(&src[..view.line_size]);
        }

        self.samples += view.samples;
        self.line_size += view.line_size;
        Ok(())
    }

    /// Timestamp in stream time-base units.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Sample frames per channel.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Channel layout bitmask.
    pub fn channel_layout(&self) -> ChannelLayout {
        self.channel_layout
    }

    /// Sample storage format.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Bytes per plane.
    pub fn line_size(&self) -> usize {
        self.line_size
    }

    /// Raw bytes of one plane, if it exists and the frame is not released.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(|p| p.as_slice())
    }

    /// True once [`release`](Self::release) has run.
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// One read-only f32 slice per channel over the owned planes.
    ///
    /// Precondition: the sample format is planar float. Calling this under
    /// any other format has no meaningful numeric interpretation; check
    /// [`format`](Self::format) first.
    ///
    /// # Panics
    /// Panics if a plane's storage is not 4-byte aligned (allocations from
    /// the global allocator are).
    pub fn typed_float_view(&self) -> Vec<&[f32]> {
        debug_assert!(
            self.format == SampleFormat::F32Planar,
            "typed_float_view called on {:?} frame",
            self.format
        );

        self.planes
            .iter()
            .map(|plane| {
                let bytes = &plane[..self.samples * 4];
                // Reinterpret is sound: every bit pattern is a valid f32 and
                // the prefix assertion rules out misalignment.
                let (prefix, floats, _) = unsafe { bytes.align_to::<f32>() };
                assert!(prefix.is_empty(), "sample plane not f32-aligned");
                floats
            })
            .collect()
    }

    /// Convert to the output engine's interleaved-f32 format.
    ///
    /// Integer samples are normalized to [-1.0, 1.0]; planar data is
    /// interleaved. The frame itself is unchanged; callers release it after
    /// conversion.
    ///
    /// # Errors
    /// - `InvalidState` if the frame has been released
    pub fn to_engine_buffer(&self) -> Result<EngineBuffer> {
        if self.released {
            return Err(Error::InvalidState(
                "cannot convert a released frame".to_string(),
            ));
        }

        let channels = self.channels as usize;
        let mut samples = Vec::with_capacity(self.samples * channels);

        match self.format {
            SampleFormat::F32Planar => {
                let views = self.typed_float_view();
                for frame_idx in 0..self.samples {
                    for view in &views {
                        samples.push(view[frame_idx]);
                    }
                }
            }
            SampleFormat::F32 => {
                let bytes = &self.planes[0][..self.samples * channels * 4];
                samples.extend(
                    bytes
                        .chunks_exact(4)
                        .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
                );
            }
            SampleFormat::I16Planar => {
                let planes: Vec<Vec<f32>> = self
                    .planes
                    .iter()
                    .map(|p| Self::plane_to_f32_i16(&p[..self.samples * 2]))
                    .collect();
                for frame_idx in 0..self.samples {
                    for plane in &planes {
                        samples.push(plane[frame_idx]);
                    }
                }
            }
            SampleFormat::I16 => {
                let bytes = &self.planes[0][..self.samples * channels * 2];
                samples = Self::plane_to_f32_i16(bytes);
            }
            SampleFormat::I32Planar => {
                let planes: Vec<Vec<f32>> = self
                    .planes
                    .iter()
                    .map(|p| Self::plane_to_f32_i32(&p[..self.samples * 4]))
                    .collect();
                for frame_idx in 0..self.samples {
                    for plane in &planes {
                        samples.push(plane[frame_idx]);
                    }
                }
            }
            SampleFormat::I32 => {
                let bytes = &self.planes[0][..self.samples * channels * 4];
                samples = Self::plane_to_f32_i32(bytes);
            }
        }

        Ok(EngineBuffer {
            samples,
            channels: self.channels,
            sample_rate: self.sample_rate,
        })
    }

    /// Release every owned plane. Idempotent; the first call deallocates,
    /// later calls are no-ops.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.planes = Vec::new();
        self.released = true;
    }

    fn plane_to_f32_i16(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(2)
            .map(|b| i16::from_ne_bytes([b[0], b[1]]) as f32 / i16::MAX as f32)
            .collect()
    }

    fn plane_to_f32_i32(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f32 / i32::MAX as f32)
            .collect()
    }
}

impl Drop for BufferedFrame {
    fn drop(&mut self) {
        // Backstop for frames discarded before consumption
        self.release();
    }
}

impl PartialEq for BufferedFrame {
    fn eq(&self, other: &Self) -> bool {
        self.timestamp == other.timestamp
    }
}

impl Eq for BufferedFrame {}

impl PartialOrd for BufferedFrame {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for BufferedFrame {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.timestamp.cmp(&other.timestamp)
    }
}

impl Hash for BufferedFrame {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.timestamp.hash(state);
    }
}
