//! # Tactus Audio Player (tactus-ap)
//!
//! Playback buffering and scheduling for a desktop audio player.
//!
//! **Purpose:** Decouple slow, variable-latency audio decoding from
//! continuous real-time output by maintaining a decode-ahead buffer and a
//! strict scheduling discipline: a tiered latency/memory policy picks how
//! far ahead to decode, a serialized lane guarantees one decode-and-submit
//! operation in flight at a time, and decoded samples travel as owned
//! deep-copied buffers that are released exactly once.
//!
//! **Architecture:** symphonia decode → owned buffered frames → scheduler →
//! cpal output, with completion callbacks re-arming the next decode cycle.

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
