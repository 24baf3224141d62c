//! Error types for the renderer audio core
//!
//! Hot-path conditions (ring full, ring under-run) are deliberately not
//! represented here: they are encoded as short counts and statistics
//! counters so the data path never unwinds. These types cover startup,
//! configuration, and track-boundary failures.

use thiserror::Error;

/// Main error type for the renderer
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Privilege error: {0}")]
    Privilege(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio data-path errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// Frame length violates the converter's alignment contract.
    /// The frame must be dropped by the caller.
    #[error("Invalid frame length {len} for {format} (must be a multiple of {align})")]
    InvalidFormat {
        format: &'static str,
        len: usize,
        align: usize,
    },

    /// A planar DSD frame exceeds what the ring can ever hold; such a
    /// frame is pushed whole or not at all.
    #[error("Frame of {len} bytes exceeds ring capacity ({max} usable bytes)")]
    FrameTooLarge { len: usize, max: usize },

    /// Ring failed to drain below the watermark at a track boundary.
    #[error("Format transition blocked: ring did not drain within {0} ms")]
    FormatTransitionTimeout(u64),

    /// Staging region allocation failed at ring construction.
    #[error("Staging region allocation failed ({size} bytes, {align}-byte aligned)")]
    StagingAlloc { size: usize, align: usize },

    /// Writer used while the engine is not running.
    #[error("Engine is not running")]
    NotRunning,
}

/// Network / transmit sink errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Connect failed: {0}")]
    ConnectFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Packet too large: {0} bytes")]
    PacketTooLarge(usize),
}

/// Result type alias for the renderer
pub type Result<T> = std::result::Result<T, Error>;
