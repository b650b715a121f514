//! # Tactus Common Library
//!
//! Shared code for the Tactus audio player:
//! - Playback event types and the completion-signal channel
//! - Stream time-base and timestamp conversion utilities

pub mod events;
pub mod timing;

pub use events::{event_channel, EventRx, EventTx, PlaybackEvent};
pub use timing::TimeBase;
