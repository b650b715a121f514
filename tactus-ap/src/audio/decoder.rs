//! Decode resource backed by symphonia
//!
//! [`DecodeContext`] owns one stream's native decode state through an
//! acquire → open → destroy lifecycle and implements [`FrameDecoder`], the
//! interface the scheduler consumes. Decoded samples are converted to
//! planar f32 and deep-copied into [`BufferedFrame`]s, so nothing outside
//! this module ever borrows decoder-owned memory.

use crate::audio::frame::BufferedFrame;
use crate::audio::types::{ChannelLayout, FrameView, SampleFormat, StreamParams};
use crate::error::{Error, Result};
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{CodecParameters, Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::core::units::Time;
use tracing::{debug, info, warn};

/// Frame decoder interface consumed by the scheduler.
///
/// `decode` returns at most one buffer per call, aggregating decoded frames
/// until roughly `max_samples` sample frames have accumulated or the stream
/// ends. Implementations are not safe for concurrent decode calls; the
/// scheduler serializes access.
pub trait FrameDecoder: Send {
    /// Decode up to `max_samples` sample frames into one owned buffer.
    ///
    /// Returns `Ok(None)` when no samples are currently available (end of
    /// stream or a temporary stall).
    fn decode(&mut self, max_samples: usize) -> Result<Option<BufferedFrame>>;

    /// Seek the decode path to `seconds` from stream start.
    fn seek_to_time(&mut self, seconds: f64) -> Result<()>;

    /// True once the underlying stream is exhausted. Observed after each
    /// decode call; cleared by a successful seek.
    fn end_of_stream(&self) -> bool;
}

/// Lifecycle state of a decode context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContextState {
    /// Parameters resolved, decoder not yet initialized
    Acquired,
    /// Ready to decode
    Open,
    /// Destroyed; terminal
    Closed,
}

/// Per-stream decode context.
///
/// Transitions `Acquired` → `Open` at most once via [`open`](Self::open)
/// and to `Closed` at most once via [`destroy`](Self::destroy); repeated
/// destroy calls are no-ops. `Drop` destroys as a backstop, but callers
/// should destroy deterministically when playback of the stream ends.
pub struct DecodeContext {
    state: ContextState,
    format: Option<Box<dyn FormatReader>>,
    decoder: Option<Box<dyn Decoder>>,
    codec_params: CodecParameters,
    track_id: u32,
    params: StreamParams,
    eos: bool,
    /// Per-channel f32 conversion scratch, reused across packets
    scratch: Vec<Vec<f32>>,
}

impl DecodeContext {
    /// Probe a media file and resolve its stream parameters.
    ///
    /// # Errors
    /// - `ContextAllocation` if the source cannot be opened or probed
    /// - `CodecNotFound` if no track carries a supported codec
    /// - `ParameterCopy` if required stream parameters are missing
    pub fn acquire(path: &Path) -> Result<Self> {
        debug!("Acquiring decode context for {}", path.display());

        let file = std::fs::File::open(path).map_err(|e| {
            Error::ContextAllocation(format!("failed to open {}: {}", path.display(), e))
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        // Hint the format registry with the file extension
        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::ContextAllocation(format!("failed to probe format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                Error::CodecNotFound("no track with a supported codec".to_string())
            })?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| Error::ParameterCopy("sample rate missing from stream".to_string()))?;

        let channels = codec_params
            .channels
            .ok_or_else(|| Error::ParameterCopy("channel count missing from stream".to_string()))?;

        let time_base = codec_params
            .time_base
            .map(|tb| tactus_common::TimeBase::new(tb.numer, tb.denom))
            .unwrap_or_else(|| tactus_common::TimeBase::from_sample_rate(sample_rate));

        let params = StreamParams {
            sample_rate,
            channels: channels.count() as u16,
            channel_layout: ChannelLayout::from_bits(channels.bits() as u64),
            // Everything is converted to planar f32 on the way out
            format: SampleFormat::F32Planar,
            time_base,
        };

        debug!(
            "Stream parameters resolved: {}Hz, {} channels",
            params.sample_rate, params.channels
        );

        Ok(Self {
            state: ContextState::Acquired,
            format: Some(format),
            decoder: None,
            codec_params,
            track_id,
            params,
            eos: false,
            scratch: Vec::new(),
        })
    }

    /// Initialize the decoder and transition to the open state.
    ///
    /// # Errors
    /// - `DecoderInit` carrying the backend's failure detail
    /// - `InvalidState` if the context is already open or destroyed
    pub fn open(&mut self) -> Result<()> {
        if self.state != ContextState::Acquired {
            return Err(Error::InvalidState(format!(
                "open called on {:?} decode context",
                self.state
            )));
        }

        let decoder = symphonia::default::get_codecs()
            .make(&self.codec_params, &DecoderOptions::default())
            .map_err(|e| Error::DecoderInit(e.to_string()))?;

        self.decoder = Some(decoder);
        self.state = ContextState::Open;

        info!(
            "Decode context opened: {}Hz, {} channels",
            self.params.sample_rate, self.params.channels
        );
        Ok(())
    }

    /// Close the context and release decoder resources.
    ///
    /// Idempotent and best-effort; repeated calls are no-ops.
    pub fn destroy(&mut self) {
        if self.state == ContextState::Closed {
            return;
        }
        self.decoder = None;
        self.format = None;
        self.scratch = Vec::new();
        self.state = ContextState::Closed;
        debug!("Decode context destroyed");
    }

    /// Resolved stream parameters.
    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    /// True once the context has been opened (and not yet destroyed).
    pub fn is_open(&self) -> bool {
        self.state == ContextState::Open
    }

    /// Convert one decoded buffer into per-channel f32 planes.
    fn copy_to_planar_f32(decoded: &AudioBufferRef<'_>, planes: &mut Vec<Vec<f32>>) {
        match decoded {
            AudioBufferRef::F32(buf) => Self::copy_planes(buf, planes, |s| s),
            AudioBufferRef::F64(buf) => Self::copy_planes(buf, planes, |s| s as f32),
            AudioBufferRef::S32(buf) => {
                Self::copy_planes(buf, planes, |s| s as f32 / i32::MAX as f32)
            }
            AudioBufferRef::S16(buf) => {
                Self::copy_planes(buf, planes, |s| s as f32 / i16::MAX as f32)
            }
            AudioBufferRef::S24(buf) => {
                Self::copy_planes(buf, planes, |s| s.inner() as f32 / 8_388_608.0)
            }
            AudioBufferRef::S8(buf) => {
                Self::copy_planes(buf, planes, |s| s as f32 / i8::MAX as f32)
            }
            AudioBufferRef::U32(buf) => Self::copy_planes(buf, planes, |s| {
                (s as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
            }),
            AudioBufferRef::U24(buf) => Self::copy_planes(buf, planes, |s| {
                (s.inner() as i32 - 8_388_608) as f32 / 8_388_608.0
            }),
            AudioBufferRef::U16(buf) => Self::copy_planes(buf, planes, |s| {
                (s as i32 - 32_768) as f32 / 32_768.0
            }),
            AudioBufferRef::U8(buf) => {
                Self::copy_planes(buf, planes, |s| (s as i32 - 128) as f32 / 128.0)
            }
        }
    }

    fn copy_planes<S: Sample>(
        buf: &AudioBuffer<S>,
        planes: &mut Vec<Vec<f32>>,
        to_f32: impl Fn(S) -> f32,
    ) {
        let num_channels = buf.spec().channels.count();
        planes.resize(num_channels, Vec::new());

        for (ch, plane) in planes.iter_mut().enumerate() {
            plane.clear();
            plane.extend(buf.chan(ch).iter().copied().map(&to_f32));
        }
    }

    fn f32_slice_as_bytes(samples: &[f32]) -> &[u8] {
        // Widening f32 -> u8 reinterpret; alignment can only decrease.
        unsafe {
            std::slice::from_raw_parts(samples.as_ptr() as *const u8, samples.len() * 4)
        }
    }
}

impl FrameDecoder for DecodeContext {
    fn decode(&mut self, max_samples: usize) -> Result<Option<BufferedFrame>> {
        if self.state != ContextState::Open {
            return Err(Error::InvalidState(format!(
                "decode called on {:?} decode context",
                self.state
            )));
        }

        let format = self
            .format
            .as_mut()
            .ok_or_else(|| Error::InvalidState("decode context has no format reader".to_string()))?;
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| Error::InvalidState("decode context has no decoder".to_string()))?;

        let mut aggregated: Option<BufferedFrame> = None;

        while !self.eos
            && aggregated.as_ref().map(|f| f.samples()).unwrap_or(0) < max_samples
        {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    debug!("Reached end of stream");
                    self.eos = true;
                    break;
                }
                Err(e) => {
                    // Hand back what already accumulated; surface the error
                    // on the next call if the stream is truly broken.
                    if aggregated.is_some() {
                        warn!("Error reading packet, returning partial buffer: {}", e);
                        break;
                    }
                    return Err(Error::Decode(format!("failed to read packet: {}", e)));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let timestamp = packet.ts() as i64;

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    // Malformed packet; skip it and continue with the next
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            let samples = decoded.frames();
            if samples == 0 {
                continue;
            }

            Self::copy_to_planar_f32(&decoded, &mut self.scratch);

            let plane_bytes: Vec<&[u8]> = self
                .scratch
                .iter()
                .map(|plane| Self::f32_slice_as_bytes(plane))
                .collect();

            let view = FrameView {
                timestamp,
                channel_layout: self.params.channel_layout,
                channels: self.params.channels,
                samples,
                sample_rate: self.params.sample_rate,
                line_size: samples * 4,
                format: SampleFormat::F32Planar,
                planes: &plane_bytes,
            };

            match aggregated.as_mut() {
                None => aggregated = Some(BufferedFrame::copy_from(&view)?),
                Some(frame) => frame.extend_from(&view)?,
            }
        }

        Ok(aggregated)
    }

    fn seek_to_time(&mut self, seconds: f64) -> Result<()> {
        if self.state != ContextState::Open {
            return Err(Error::InvalidState(format!(
                "seek called on {:?} decode context",
                self.state
            )));
        }

        let format = self
            .format
            .as_mut()
            .ok_or_else(|| Error::InvalidState("decode context has no format reader".to_string()))?;

        format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(seconds),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::Seek(e.to_string()))?;

        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
        self.eos = false;

        debug!("Seeked to {:.3}s", seconds);
        Ok(())
    }

    fn end_of_stream(&self) -> bool {
        self.eos
    }
}

impl Drop for DecodeContext {
    fn drop(&mut self) {
        // Backstop; explicit destroy is the primary release path
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_missing_file_is_allocation_error() {
        let result = DecodeContext::acquire(Path::new("/nonexistent/file.flac"));
        assert!(matches!(result, Err(Error::ContextAllocation(_))));
    }

    // Lifecycle and real decode behavior are covered by the integration
    // tests in tests/decoder_tests.rs against generated WAV fixtures.
}
