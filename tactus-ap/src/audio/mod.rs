//! Audio decode, buffering, and output

pub mod decoder;
pub mod frame;
pub mod output;
pub mod types;

pub use decoder::{DecodeContext, FrameDecoder};
pub use frame::{BufferedFrame, MAX_PLANES};
pub use output::{CompletionHandler, CpalOutput, OutputEngine};
pub use types::{ChannelLayout, EngineBuffer, FrameView, SampleFormat, StreamParams};
