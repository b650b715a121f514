//! Core audio data types
//!
//! Defines the sample-format, channel-layout, and stream-parameter types
//! shared by the decode resource, the buffered-frame copies, and the output
//! engine.

use tactus_common::TimeBase;

/// Sample storage format of a decoded stream.
///
/// Interleaved formats pack all channels into one plane
/// (`[L, R, L, R, ...]`); planar formats give each channel its own plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    /// Interleaved signed 16-bit integer
    I16,
    /// Interleaved signed 32-bit integer
    I32,
    /// Interleaved 32-bit float
    F32,
    /// Planar signed 16-bit integer
    I16Planar,
    /// Planar signed 32-bit integer
    I32Planar,
    /// Planar 32-bit float
    F32Planar,
}

impl SampleFormat {
    /// Bytes occupied by one sample of this format.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleFormat::I16 | SampleFormat::I16Planar => 2,
            SampleFormat::I32 | SampleFormat::I32Planar => 4,
            SampleFormat::F32 | SampleFormat::F32Planar => 4,
        }
    }

    /// True for formats where each channel has its own plane.
    pub fn is_planar(&self) -> bool {
        matches!(
            self,
            SampleFormat::I16Planar | SampleFormat::I32Planar | SampleFormat::F32Planar
        )
    }

    /// True for floating-point formats.
    pub fn is_float(&self) -> bool {
        matches!(self, SampleFormat::F32 | SampleFormat::F32Planar)
    }

    /// Number of planes a frame of this format uses for `channels` channels.
    pub fn plane_count(&self, channels: u16) -> usize {
        if self.is_planar() {
            channels as usize
        } else {
            1
        }
    }
}

/// Channel layout bitmask.
///
/// Bit positions follow the common front-left-first ordering; only the
/// layouts the player actually meets are named here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout(pub u64);

impl ChannelLayout {
    /// Front center only
    pub const MONO: ChannelLayout = ChannelLayout(0x4);
    /// Front left + front right
    pub const STEREO: ChannelLayout = ChannelLayout(0x3);
    /// 5.1 surround (FL, FR, FC, LFE, BL, BR)
    pub const SURROUND_5_1: ChannelLayout = ChannelLayout(0x3F);

    /// Build a layout from a raw bitmask.
    pub fn from_bits(bits: u64) -> Self {
        ChannelLayout(bits)
    }

    /// Default layout for a channel count.
    pub fn default_for_channels(channels: u16) -> Self {
        match channels {
            1 => Self::MONO,
            2 => Self::STEREO,
            6 => Self::SURROUND_5_1,
            // First n positions set
            n => ChannelLayout((1u64 << n.min(63)) - 1),
        }
    }

    /// Number of channels in this layout.
    pub fn count(&self) -> u16 {
        self.0.count_ones() as u16
    }
}

/// Resolved parameters of one audio stream.
///
/// Supplied once when a scheduler is initialized and read-only afterwards.
#[derive(Debug, Clone)]
pub struct StreamParams {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count
    pub channels: u16,
    /// Channel layout bitmask
    pub channel_layout: ChannelLayout,
    /// Sample storage format
    pub format: SampleFormat,
    /// Stream time base (seconds per timestamp tick)
    pub time_base: TimeBase,
}

impl StreamParams {
    /// Sample rate scaled by channel count; drives the decode-ahead policy.
    pub fn effective_sample_rate(&self) -> u64 {
        self.sample_rate as u64 * self.channels as u64
    }
}

/// Transient view of one decoded frame.
///
/// Borrows the decoder's plane memory; valid only until the next decode
/// call. [`BufferedFrame::copy_from`](crate::audio::BufferedFrame::copy_from)
/// turns it into an independently-owned copy.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    /// Timestamp in stream time-base units
    pub timestamp: i64,
    /// Channel layout bitmask
    pub channel_layout: ChannelLayout,
    /// Channel count
    pub channels: u16,
    /// Sample frames per channel
    pub samples: usize,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bytes per plane
    pub line_size: usize,
    /// Sample storage format
    pub format: SampleFormat,
    /// One plane if interleaved, `channels` planes if planar
    pub planes: &'a [&'a [u8]],
}

/// Engine-native audio buffer: interleaved f32 samples ready for output.
#[derive(Debug, Clone)]
pub struct EngineBuffer {
    /// Interleaved samples, `channels` values per frame
    pub samples: Vec<f32>,
    /// Channel count
    pub channels: u16,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl EngineBuffer {
    /// Number of sample frames (per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        tactus_common::timing::samples_to_ms(self.frame_count(), self.sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_properties() {
        assert_eq!(SampleFormat::I16.bytes_per_sample(), 2);
        assert_eq!(SampleFormat::F32Planar.bytes_per_sample(), 4);
        assert!(SampleFormat::F32Planar.is_planar());
        assert!(SampleFormat::F32Planar.is_float());
        assert!(!SampleFormat::I16.is_planar());
        assert!(!SampleFormat::I32Planar.is_float());
    }

    #[test]
    fn plane_count_follows_layout_rule() {
        assert_eq!(SampleFormat::F32Planar.plane_count(6), 6);
        assert_eq!(SampleFormat::F32.plane_count(6), 1);
        assert_eq!(SampleFormat::I16.plane_count(1), 1);
    }

    #[test]
    fn channel_layout_counts() {
        assert_eq!(ChannelLayout::MONO.count(), 1);
        assert_eq!(ChannelLayout::STEREO.count(), 2);
        assert_eq!(ChannelLayout::SURROUND_5_1.count(), 6);
        assert_eq!(ChannelLayout::default_for_channels(4).count(), 4);
    }

    #[test]
    fn effective_sample_rate() {
        let params = StreamParams {
            sample_rate: 96_000,
            channels: 2,
            channel_layout: ChannelLayout::STEREO,
            format: SampleFormat::F32Planar,
            time_base: TimeBase::from_sample_rate(96_000),
        };
        assert_eq!(params.effective_sample_rate(), 192_000);
    }

    #[test]
    fn engine_buffer_duration() {
        let buffer = EngineBuffer {
            samples: vec![0.0; 88_200],
            channels: 2,
            sample_rate: 44_100,
        };
        assert_eq!(buffer.frame_count(), 44_100);
        assert_eq!(buffer.duration_ms(), 1000);
    }
}
