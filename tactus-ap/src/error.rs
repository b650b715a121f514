//! Error types for tactus-ap
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. The four stream-setup variants (`CodecNotFound`,
//! `ContextAllocation`, `ParameterCopy`, `DecoderInit`) are fatal to the
//! stream being opened; `Decode` during steady-state scheduling is a soft
//! failure handled inside the scheduling cycle.

use thiserror::Error;

/// Main error type for tactus-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No decoder matches the stream's declared codec
    #[error("Codec not found: {0}")]
    CodecNotFound(String),

    /// Decode context could not be allocated
    #[error("Context allocation failed: {0}")]
    ContextAllocation(String),

    /// Stream parameter transfer into the decode context failed
    #[error("Parameter copy failed: {0}")]
    ParameterCopy(String),

    /// Decoder initialization failed, carrying the backend's failure detail
    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    /// Audio decoding errors (soft during steady-state scheduling)
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Seek on the decode path failed
    #[error("Seek error: {0}")]
    Seek(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Playback scheduling errors
    #[error("Playback error: {0}")]
    Playback(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using tactus-ap Error
pub type Result<T> = std::result::Result<T, Error>;
