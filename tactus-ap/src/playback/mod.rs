//! Playback scheduling

pub mod lane;
pub mod scheduler;

pub use lane::{LaneHandle, SerialLane};
pub use scheduler::{DecodeAheadPolicy, Scheduler, SchedulerState};
