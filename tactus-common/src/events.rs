//! Event types for the Tactus playback system
//!
//! Events are produced by the scheduler and delivered over a caller-supplied
//! channel. The receiver decides which execution context consumes them (UI
//! thread, service loop, test harness), so no delivery context is hardcoded
//! here.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Playback event types
///
/// Events can be serialized for transmission to external consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlaybackEvent {
    /// Scheduling started for a stream instance
    ///
    /// Emitted once per `start()` call, before the first buffer is decoded.
    PlaybackStarted {
        /// Stream instance identifier
        stream_id: Uuid,
        /// Source sample rate in Hz
        sample_rate: u32,
        /// Source channel count
        channels: u16,
    },

    /// A decode attempt failed during steady-state scheduling
    ///
    /// Soft failure: playback continues from already-submitted buffers and
    /// the next scheduled attempt. Consumers may count these to implement
    /// their own escalation policy.
    DecodeFailed {
        /// Stream instance identifier
        stream_id: Uuid,
        /// Backend error description
        detail: String,
    },

    /// A stream instance finished playing
    ///
    /// Fires exactly once per stream instance, when end of stream has been
    /// reached and the last outstanding buffer has completed.
    StreamCompleted {
        /// Stream instance identifier
        stream_id: Uuid,
    },
}

/// Sender half of the playback event channel
pub type EventTx = mpsc::UnboundedSender<PlaybackEvent>;

/// Receiver half of the playback event channel
pub type EventRx = mpsc::UnboundedReceiver<PlaybackEvent>;

/// Create the playback event channel
pub fn event_channel() -> (EventTx, EventRx) {
    mpsc::unbounded_channel()
}
