//! # Diretta Renderer
//!
//! Audio core of a UPnP AV MediaRenderer that forwards bit-exact audio to a
//! Diretta target on the local network. Decoded frames enter on one side,
//! wire-ready packets leave at a fixed cadence on the other; everything in
//! between is allocation-free and wait-free after startup.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                        decoder (upstream)                            │
//! │                               │                                      │
//! │                               ▼                                      │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │              StreamWriter (engine::producer)                   │  │
//! │  │   format decision table → push_24bit_packed / push_16_to_32    │  │
//! │  │   / push_dsd_planar / raw push, backpressure on short writes   │  │
//! │  └───────────────────────────┬────────────────────────────────────┘  │
//! │                              ▼                                       │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │                 AudioRing (audio::ring)                        │  │
//! │  │   SPSC byte FIFO ── convert into 64-byte-aligned staging,      │  │
//! │  │   bulk copy in, acquire/release head/tail, one-slot sentinel   │  │
//! │  └───────────────────────────┬────────────────────────────────────┘  │
//! │                              ▼                                       │
//! │  ┌────────────────────────────────────────────────────────────────┐  │
//! │  │              CadenceLoop (engine::consumer)                    │  │
//! │  │   real-time thread, one packet per cycle, silence on           │  │
//! │  │   under-run, Idle → Priming → Streaming → Draining             │  │
//! │  └───────────────────────────┬────────────────────────────────────┘  │
//! │                              ▼                                       │
//! │                TransmitSink (network::sink) → Diretta target         │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod diag;
pub mod engine;
pub mod error;
pub mod network;
pub mod privilege;
pub mod renderer;

pub use error::{Error, Result};
pub use renderer::DirettaRenderer;

/// Application-wide constants
pub mod constants {
    /// DSD idle byte (`01101001`), the standard DSD silence marker
    pub const DSD_SILENCE_BYTE: u8 = 0x69;

    /// PCM silence byte
    pub const PCM_SILENCE_BYTE: u8 = 0x00;

    /// Size of each conversion staging region in bytes
    pub const STAGING_REGION_BYTES: usize = 65_536;

    /// Staging region alignment in bytes (one cache line)
    pub const STAGING_ALIGN: usize = 64;

    /// Default ring depth in seconds of audio
    pub const DEFAULT_BUFFER_SECONDS: f64 = 10.0;

    /// Recommended minimum ring depth for DSD / hi-res material
    pub const MIN_RECOMMENDED_BUFFER_SECONDS: f64 = 2.0;

    /// Lower bound of the transmit cycle time in microseconds
    pub const MIN_CYCLE_TIME_US: u64 = 333;

    /// Upper bound of the transmit cycle time in microseconds
    pub const MAX_CYCLE_TIME_US: u64 = 10_000;

    /// Default transmit cycle time in microseconds
    pub const DEFAULT_CYCLE_TIME_US: u64 = 2_000;

    /// Default bytes handed to the transmit sink per cycle
    pub const DEFAULT_PACKET_BYTES: usize = 1_408;

    /// Peak wire byte rate the ring is sized against:
    /// DSD512 stereo and 768 kHz / 32-bit / 2 ch PCM both land here.
    pub const PEAK_STREAM_BYTES_PER_SEC: u64 = 6_144_000;

    /// Consecutive under-runs before the cadence loop re-enters Priming
    pub const UNDERRUN_REPRIME_THRESHOLD: u32 = 3;

    /// Default UDP port of the Diretta target
    pub const DEFAULT_TARGET_PORT: u16 = 47_000;

    /// Default HTTP port of the diagnostics server
    pub const DEFAULT_DIAG_PORT: u16 = 8_389;
}
