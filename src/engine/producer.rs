//! Producer adapter between the upstream decoder and the ring
//!
//! The adapter owns the active stream descriptor and routes every decoded
//! frame through the matching ring entry point. A short push means the
//! ring is full: the adapter parks on the space channel the cadence loop
//! signals after each pop, so audio is never dropped during nominal
//! operation. Format changes wait for the ring to drain so incompatible
//! encodings are never mixed byte-wise inside the FIFO.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError};

use crate::audio::format::{DsdLayout, SampleFormat, StreamFormat};
use crate::audio::ring::SharedAudioRing;
use crate::engine::stats::EngineStats;
use crate::engine::EngineShared;
use crate::error::AudioError;

/// PCM word width the Diretta target consumes; selects the S16 widening
/// path in the decision table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum WireWidth {
    /// Packed 24-bit words on the wire
    W24,
    #[default]
    /// 32-bit words on the wire
    W32,
}

/// Resolved push route for the active stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushRoute {
    Pack24,
    Pack24Shifted,
    Widen16To24,
    Widen16To32,
    /// Source bytes are already wire-shaped
    Raw,
    Dsd(DsdLayout),
}

impl PushRoute {
    /// Fixed decision table keyed by the declared stream format
    fn for_format(format: &StreamFormat, wire_width: WireWidth) -> Self {
        match format.sample_format {
            SampleFormat::S16Le => match wire_width {
                WireWidth::W24 => PushRoute::Widen16To24,
                WireWidth::W32 => PushRoute::Widen16To32,
            },
            SampleFormat::S24P32Lsb => PushRoute::Pack24,
            SampleFormat::S24P32Msb => PushRoute::Pack24Shifted,
            SampleFormat::S24Le | SampleFormat::S32Le => PushRoute::Raw,
            SampleFormat::DsdU8 => PushRoute::Dsd(format.dsd_layout),
        }
    }
}

/// Producer-side handle feeding decoded frames into the ring
pub struct StreamWriter {
    ring: SharedAudioRing,
    shared: Arc<EngineShared>,
    stats: Arc<EngineStats>,
    space_rx: Receiver<()>,

    format: StreamFormat,
    route: PushRoute,
    wire_width: WireWidth,

    /// Drain watermark for format transitions: one packet's worth
    drain_watermark: usize,
    transition_timeout: Duration,
    backpressure_wait: Duration,
}

impl StreamWriter {
    pub(crate) fn new(
        ring: SharedAudioRing,
        shared: Arc<EngineShared>,
        stats: Arc<EngineStats>,
        space_rx: Receiver<()>,
        initial_format: StreamFormat,
        wire_width: WireWidth,
        drain_watermark: usize,
        transition_timeout: Duration,
    ) -> Self {
        let route = PushRoute::for_format(&initial_format, wire_width);
        shared
            .silence_byte
            .store(initial_format.silence_byte(), Ordering::Relaxed);

        Self {
            ring,
            shared,
            stats,
            space_rx,
            format: initial_format,
            route,
            wire_width,
            drain_watermark,
            transition_timeout,
            backpressure_wait: Duration::from_millis(50),
        }
    }

    pub fn format(&self) -> &StreamFormat {
        &self.format
    }

    /// Mark the stream live; the cadence loop leaves Idle on its next
    /// tick and starts priming.
    pub fn start_stream(&mut self) {
        self.shared.end_of_stream.store(false, Ordering::Release);
        self.shared.stream_active.store(true, Ordering::Release);
        tracing::info!(format = %self.format, "stream started");
    }

    /// Push one decoded frame, blocking on backpressure until the whole
    /// frame has been consumed. Returns the frame length.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<usize, AudioError> {
        if frame.is_empty() {
            return Ok(0);
        }
        let align = self.format.frame_align();
        if frame.len() % align != 0 {
            EngineStats::count(&self.stats.invalid_frames);
            return Err(AudioError::InvalidFormat {
                format: self.format.sample_format.name(),
                len: frame.len(),
                align,
            });
        }

        if matches!(self.route, PushRoute::Dsd(_)) && frame.len() > self.ring.size() - 1 {
            EngineStats::count(&self.stats.invalid_frames);
            return Err(AudioError::FrameTooLarge {
                len: frame.len(),
                max: self.ring.size() - 1,
            });
        }

        EngineStats::count(&self.stats.frames_in);

        let mut offset = 0;
        while offset < frame.len() {
            if !self.shared.running.load(Ordering::Acquire) {
                return Err(AudioError::NotRunning);
            }

            let consumed = match self.route {
                PushRoute::Pack24 => self.ring.push_24bit_packed(&frame[offset..]),
                PushRoute::Pack24Shifted => self.ring.push_24bit_packed_shifted(&frame[offset..]),
                PushRoute::Widen16To24 => self.ring.push_16_to_24(&frame[offset..]),
                PushRoute::Widen16To32 => self.ring.push_16_to_32(&frame[offset..]),
                PushRoute::Raw => self.ring.push(&frame[offset..]),
                PushRoute::Dsd(layout) => {
                    self.ring.push_dsd_planar(&frame[offset..], self.format.channels, layout)
                }
            };
            offset += consumed;

            if offset < frame.len() {
                // Ring full: park until the consumer frees space
                EngineStats::count(&self.stats.backpressure_waits);
                match self.space_rx.recv_timeout(self.backpressure_wait) {
                    Ok(()) | Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return Err(AudioError::NotRunning),
                }
            }
        }

        EngineStats::add(&self.stats.bytes_pushed, frame.len() as u64);
        Ok(frame.len())
    }

    /// Change the stream descriptor at a track boundary.
    ///
    /// Waits for the ring to drain below one packet so encodings never
    /// mix inside the FIFO; on timeout the consumer is told to flush and
    /// the change proceeds over the hard drain.
    pub fn set_format(&mut self, format: StreamFormat) -> Result<(), AudioError> {
        if format == self.format {
            return Ok(());
        }

        let deadline = Instant::now() + self.transition_timeout;
        while self.ring.available() >= self.drain_watermark {
            if !self.shared.running.load(Ordering::Acquire) {
                return Err(AudioError::NotRunning);
            }
            if Instant::now() >= deadline {
                tracing::warn!(
                    available = self.ring.available(),
                    "format transition blocked, escalating to hard drain"
                );
                self.shared.flush_requested.store(true, Ordering::Release);

                let flush_deadline = Instant::now() + self.transition_timeout;
                while self.ring.available() > 0 {
                    if Instant::now() >= flush_deadline {
                        return Err(AudioError::FormatTransitionTimeout(
                            self.transition_timeout.as_millis() as u64,
                        ));
                    }
                    let _ = self.space_rx.recv_timeout(Duration::from_millis(5));
                }
                break;
            }
            let _ = self.space_rx.recv_timeout(Duration::from_millis(5));
        }

        tracing::info!(from = %self.format, to = %format, "format change");
        self.format = format;
        self.route = PushRoute::for_format(&format, self.wire_width);
        self.shared
            .silence_byte
            .store(format.silence_byte(), Ordering::Relaxed);
        EngineStats::count(&self.stats.format_changes);
        Ok(())
    }

    /// Signal end-of-stream; the cadence loop drains the ring and
    /// returns to Idle.
    pub fn finish(&self) {
        self.shared.stream_active.store(false, Ordering::Release);
        self.shared.end_of_stream.store(true, Ordering::Release);
        tracing::info!("end of stream signalled");
    }
}
