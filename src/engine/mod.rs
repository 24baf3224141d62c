//! Streaming engine: producer adapter and transmit cadence loop

pub mod consumer;
pub mod producer;
pub mod stats;

pub use consumer::{CadenceConfig, CadenceHandle, CadenceLoop};
pub use producer::{StreamWriter, WireWidth};
pub use stats::{EngineState, EngineStats, StatsSnapshot};

use std::sync::atomic::{AtomicBool, AtomicU8};

use crate::constants::PCM_SILENCE_BYTE;

/// Flags shared between the producer adapter, the cadence loop and the
/// renderer facade. All cross-thread coordination outside the ring
/// counters goes through here.
#[derive(Debug)]
pub(crate) struct EngineShared {
    /// Cleared by the renderer to stop the cadence thread
    pub running: AtomicBool,
    /// Raised by the producer while a stream is live
    pub stream_active: AtomicBool,
    /// Raised by the producer at end-of-stream; cleared by the consumer
    /// once the ring has drained
    pub end_of_stream: AtomicBool,
    /// Hard-drain escalation from a blocked format transition
    pub flush_requested: AtomicBool,
    /// Under-run padding byte for the active stream
    pub silence_byte: AtomicU8,
}

impl EngineShared {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            stream_active: AtomicBool::new(false),
            end_of_stream: AtomicBool::new(false),
            flush_requested: AtomicBool::new(false),
            silence_byte: AtomicU8::new(PCM_SILENCE_BYTE),
        }
    }
}
