//! Engine statistics
//!
//! Hot-path threads only touch relaxed atomic counters here; snapshots
//! for logging and the diagnostics endpoint are taken out-of-band.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use serde::Serialize;

/// Consumer state as published for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Idle,
    Priming,
    Streaming,
    Draining,
}

impl EngineState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            1 => EngineState::Priming,
            2 => EngineState::Streaming,
            3 => EngineState::Draining,
            _ => EngineState::Idle,
        }
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            EngineState::Idle => 0,
            EngineState::Priming => 1,
            EngineState::Streaming => 2,
            EngineState::Draining => 3,
        }
    }
}

/// Shared atomic counters for the producer and consumer threads
#[derive(Debug, Default)]
pub struct EngineStats {
    pub frames_in: AtomicU64,
    pub bytes_pushed: AtomicU64,
    pub bytes_popped: AtomicU64,
    pub packets_sent: AtomicU64,
    pub silence_packets: AtomicU64,
    pub underruns: AtomicU64,
    pub missed_ticks: AtomicU64,
    pub transmit_errors: AtomicU64,
    pub invalid_frames: AtomicU64,
    pub format_changes: AtomicU64,
    pub backpressure_waits: AtomicU64,
    pub(crate) state: AtomicU8,
}

impl EngineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn count(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Point-in-time copy for logging and the diagnostics endpoint
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            state: self.state(),
            frames_in: self.frames_in.load(Ordering::Relaxed),
            bytes_pushed: self.bytes_pushed.load(Ordering::Relaxed),
            bytes_popped: self.bytes_popped.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            silence_packets: self.silence_packets.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            missed_ticks: self.missed_ticks.load(Ordering::Relaxed),
            transmit_errors: self.transmit_errors.load(Ordering::Relaxed),
            invalid_frames: self.invalid_frames.load(Ordering::Relaxed),
            format_changes: self.format_changes.load(Ordering::Relaxed),
            backpressure_waits: self.backpressure_waits.load(Ordering::Relaxed),
        }
    }
}

/// Serializable statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub state: EngineState,
    pub frames_in: u64,
    pub bytes_pushed: u64,
    pub bytes_popped: u64,
    pub packets_sent: u64,
    pub silence_packets: u64,
    pub underruns: u64,
    pub missed_ticks: u64,
    pub transmit_errors: u64,
    pub invalid_frames: u64,
    pub format_changes: u64,
    pub backpressure_waits: u64,
}
