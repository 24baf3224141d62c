//! Transmit cadence loop
//!
//! A single thread pops one packet's worth of bytes per cycle and hands
//! it to the transmit sink. The tick deadline is absolute, so a slow
//! cycle does not shift the cadence. After startup the loop performs no
//! allocation and no syscalls beyond the sink send and the inter-tick
//! sleep; when the ring runs dry it pads with the stream's silence byte
//! instead of waiting on the producer.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::audio::ring::SharedAudioRing;
use crate::engine::stats::{EngineState, EngineStats};
use crate::engine::EngineShared;
use crate::network::sink::TransmitSink;

/// Cadence parameters, fixed for the lifetime of the loop
#[derive(Debug, Clone)]
pub struct CadenceConfig {
    /// Tick period; validated into [333, 10000] µs by the config layer
    pub cycle: Duration,
    /// Bytes handed to the sink per tick
    pub packet_bytes: usize,
    /// `available()` level at which Priming promotes to Streaming
    pub prime_watermark: usize,
    /// Consecutive under-runs before Streaming demotes to Priming
    pub reprime_threshold: u32,
}

/// Handle used to stop and join the cadence thread
pub struct CadenceHandle {
    shared: Arc<EngineShared>,
    thread: Option<JoinHandle<()>>,
}

impl CadenceHandle {
    /// Signal the loop to exit and join it
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }
}

impl Drop for CadenceHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The cadence loop itself; constructed by the renderer, consumed by its
/// own thread.
pub struct CadenceLoop {
    ring: SharedAudioRing,
    sink: Box<dyn TransmitSink>,
    config: CadenceConfig,
    shared: Arc<EngineShared>,
    stats: Arc<EngineStats>,
    /// Token to the producer after every pop; bounded(1), never blocks
    space_tx: Sender<()>,
}

impl CadenceLoop {
    pub(crate) fn spawn(
        ring: SharedAudioRing,
        sink: Box<dyn TransmitSink>,
        config: CadenceConfig,
        shared: Arc<EngineShared>,
        stats: Arc<EngineStats>,
        space_tx: Sender<()>,
    ) -> std::io::Result<CadenceHandle> {
        let handle_shared = shared.clone();
        let cadence = CadenceLoop {
            ring,
            sink,
            config,
            shared,
            stats,
            space_tx,
        };

        let thread = thread::Builder::new()
            .name("diretta-cadence".into())
            .spawn(move || cadence.run())?;

        Ok(CadenceHandle {
            shared: handle_shared,
            thread: Some(thread),
        })
    }

    fn run(mut self) {
        apply_realtime_priority();

        let mut packet = vec![0u8; self.config.packet_bytes];
        let mut state = EngineState::Idle;
        let mut consecutive_underruns: u32 = 0;
        let mut next_tick = Instant::now() + self.config.cycle;

        self.stats.set_state(state);
        tracing::debug!(
            cycle_us = self.config.cycle.as_micros() as u64,
            packet_bytes = self.config.packet_bytes,
            "cadence loop started"
        );

        while self.shared.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < next_tick {
                thread::sleep(next_tick - now);
            } else if now - next_tick > self.config.cycle {
                // Fell more than a full cycle behind; re-anchor instead of
                // bursting catch-up packets.
                EngineStats::count(&self.stats.missed_ticks);
                next_tick = now;
            }
            next_tick += self.config.cycle;

            if self.shared.flush_requested.swap(false, Ordering::AcqRel) {
                self.hard_drain(&mut packet);
            }

            let next = match state {
                EngineState::Idle => self.tick_idle(),
                EngineState::Priming => self.tick_priming(&mut packet),
                EngineState::Streaming => self.tick_streaming(&mut packet, &mut consecutive_underruns),
                EngineState::Draining => self.tick_draining(&mut packet),
            };

            if next != state {
                tracing::debug!(from = ?state, to = ?next, "cadence state change");
                if next == EngineState::Streaming {
                    consecutive_underruns = 0;
                }
                state = next;
                self.stats.set_state(state);
            }
        }

        tracing::debug!("cadence loop stopped");
    }

    fn tick_idle(&self) -> EngineState {
        if self.shared.stream_active.load(Ordering::Acquire) {
            EngineState::Priming
        } else {
            EngineState::Idle
        }
    }

    fn tick_priming(&mut self, packet: &mut [u8]) -> EngineState {
        if self.shared.end_of_stream.load(Ordering::Acquire) {
            return EngineState::Draining;
        }
        if self.ring.available() >= self.config.prime_watermark {
            return EngineState::Streaming;
        }

        self.send_silence(packet);
        EngineState::Priming
    }

    fn tick_streaming(&mut self, packet: &mut [u8], consecutive_underruns: &mut u32) -> EngineState {
        let got = self.ring.pop(packet);
        if got > 0 {
            EngineStats::add(&self.stats.bytes_popped, got as u64);
            let _ = self.space_tx.try_send(());
        }

        if got < packet.len() {
            let silence = self.shared.silence_byte.load(Ordering::Relaxed);
            packet[got..].fill(silence);
            EngineStats::count(&self.stats.underruns);
            *consecutive_underruns += 1;
        } else {
            *consecutive_underruns = 0;
        }

        if let Err(e) = self.sink.send_packet(packet) {
            EngineStats::count(&self.stats.transmit_errors);
            tracing::warn!("transmit failed, re-priming: {e}");
            return EngineState::Priming;
        }
        EngineStats::count(&self.stats.packets_sent);

        if self.shared.end_of_stream.load(Ordering::Acquire) {
            return EngineState::Draining;
        }
        if *consecutive_underruns >= self.config.reprime_threshold {
            tracing::warn!(
                underruns = *consecutive_underruns,
                "sustained underflow, re-priming"
            );
            return EngineState::Priming;
        }
        EngineState::Streaming
    }

    fn tick_draining(&mut self, packet: &mut [u8]) -> EngineState {
        let got = self.ring.pop(packet);
        if got > 0 {
            EngineStats::add(&self.stats.bytes_popped, got as u64);
            let _ = self.space_tx.try_send(());

            let silence = self.shared.silence_byte.load(Ordering::Relaxed);
            packet[got..].fill(silence);
            if self.sink.send_packet(packet).is_ok() {
                EngineStats::count(&self.stats.packets_sent);
            } else {
                EngineStats::count(&self.stats.transmit_errors);
            }
        }

        if self.ring.available() == 0 {
            self.shared.end_of_stream.store(false, Ordering::Release);
            tracing::info!("stream drained");
            return EngineState::Idle;
        }
        EngineState::Draining
    }

    fn send_silence(&mut self, packet: &mut [u8]) {
        let silence = self.shared.silence_byte.load(Ordering::Relaxed);
        packet.fill(silence);
        match self.sink.send_packet(packet) {
            Ok(()) => EngineStats::count(&self.stats.silence_packets),
            Err(_) => EngineStats::count(&self.stats.transmit_errors),
        }
    }

    /// Discard everything buffered; used by the format-transition
    /// escalation path.
    fn hard_drain(&mut self, packet: &mut [u8]) {
        let mut discarded = 0usize;
        loop {
            let got = self.ring.pop(packet);
            if got == 0 {
                break;
            }
            discarded += got;
        }
        if discarded > 0 {
            tracing::warn!(bytes = discarded, "hard drain discarded buffered audio");
        }
        let _ = self.space_tx.try_send(());
    }
}

/// Elevate the calling thread to the real-time scheduling class.
/// Needs CAP_SYS_NICE; failure is logged and the loop continues at
/// normal priority.
#[cfg(target_os = "linux")]
fn apply_realtime_priority() {
    let param = libc::sched_param { sched_priority: 70 };
    // SAFETY: plain syscall on the calling thread with a valid param.
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        tracing::warn!(
            "SCHED_FIFO unavailable ({}), cadence thread stays at normal priority",
            std::io::Error::last_os_error()
        );
    } else {
        tracing::debug!("cadence thread elevated to SCHED_FIFO");
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_realtime_priority() {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ring::AudioRing;
    use crate::error::NetworkError;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex;

    /// Sink that records every packet it is handed
    struct CaptureSink {
        packets: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: Arc<AtomicBool>,
    }

    impl TransmitSink for CaptureSink {
        fn send_packet(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(NetworkError::SendFailed("test failure".into()));
            }
            self.packets.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
    }

    struct Harness {
        ring: SharedAudioRing,
        shared: Arc<EngineShared>,
        stats: Arc<EngineStats>,
        packets: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: Arc<AtomicBool>,
        handle: CadenceHandle,
        _space_rx: crossbeam_channel::Receiver<()>,
    }

    fn start_harness(packet_bytes: usize, prime_watermark: usize) -> Harness {
        let ring = Arc::new(AudioRing::new(4096, 0).unwrap());
        let shared = Arc::new(EngineShared::new());
        let stats = Arc::new(EngineStats::new());
        let packets = Arc::new(Mutex::new(Vec::new()));
        let fail = Arc::new(AtomicBool::new(false));
        let (space_tx, space_rx) = crossbeam_channel::bounded(1);

        let sink = CaptureSink {
            packets: packets.clone(),
            fail: fail.clone(),
        };
        let config = CadenceConfig {
            cycle: Duration::from_micros(500),
            packet_bytes,
            prime_watermark,
            reprime_threshold: 3,
        };
        let handle = CadenceLoop::spawn(
            ring.clone(),
            Box::new(sink),
            config,
            shared.clone(),
            stats.clone(),
            space_tx,
        )
        .unwrap();

        Harness {
            ring,
            shared,
            stats,
            packets,
            fail,
            handle,
            _space_rx: space_rx,
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F, ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn idle_loop_transmits_nothing() {
        let mut h = start_harness(64, 512);
        thread::sleep(Duration::from_millis(20));

        assert_eq!(h.stats.state(), EngineState::Idle);
        assert!(h.packets.lock().unwrap().is_empty());
        h.handle.stop();
    }

    #[test]
    fn primes_with_silence_then_streams() {
        let mut h = start_harness(64, 512);
        h.shared.silence_byte.store(0x69, Ordering::Relaxed);
        h.shared.stream_active.store(true, Ordering::Release);

        assert!(wait_for(|| h.stats.snapshot().silence_packets > 2, 500));
        assert_eq!(h.stats.state(), EngineState::Priming);
        {
            let packets = h.packets.lock().unwrap();
            assert!(packets.iter().all(|p| p.iter().all(|&b| b == 0x69)));
        }

        // Cross the watermark: the loop must start popping real data
        let data = vec![0xC3u8; 1024];
        h.ring.push(&data);
        assert!(wait_for(|| h.stats.state() == EngineState::Streaming, 500));
        assert!(wait_for(|| h.stats.snapshot().bytes_popped >= 1024, 500));

        h.handle.stop();
        let packets = h.packets.lock().unwrap();
        assert!(packets.iter().any(|p| p.iter().all(|&b| b == 0xC3)));
    }

    #[test]
    fn underruns_pad_with_silence_and_reprime() {
        let mut h = start_harness(64, 128);
        h.shared.stream_active.store(true, Ordering::Release);
        h.ring.push(&vec![0x55u8; 160]); // 2.5 packets, then dry

        assert!(wait_for(|| h.stats.state() == EngineState::Streaming, 500));
        // 3 consecutive under-runs demote back to Priming
        assert!(wait_for(|| h.stats.state() == EngineState::Priming, 500));
        assert!(h.stats.snapshot().underruns >= 3);

        // The short third packet is padded with PCM silence
        h.handle.stop();
        let packets = h.packets.lock().unwrap();
        let padded = packets
            .iter()
            .find(|p| p.starts_with(&[0x55]) && p.ends_with(&[0x00]))
            .expect("no padded packet seen");
        assert_eq!(padded.len(), 64);
    }

    #[test]
    fn end_of_stream_drains_to_idle() {
        let mut h = start_harness(64, 128);
        h.shared.stream_active.store(true, Ordering::Release);
        h.ring.push(&vec![0x11u8; 256]);

        assert!(wait_for(|| h.stats.state() == EngineState::Streaming, 500));

        h.shared.end_of_stream.store(true, Ordering::Release);
        h.shared.stream_active.store(false, Ordering::Release);

        assert!(wait_for(|| h.stats.state() == EngineState::Idle, 500));
        assert_eq!(h.ring.available(), 0);
        assert!(!h.shared.end_of_stream.load(Ordering::Acquire));
        h.handle.stop();
    }

    #[test]
    fn transmit_failure_reprimes() {
        let mut h = start_harness(64, 128);
        h.shared.stream_active.store(true, Ordering::Release);
        h.ring.push(&vec![0x77u8; 1024]);

        assert!(wait_for(|| h.stats.state() == EngineState::Streaming, 500));

        h.fail.store(true, Ordering::Relaxed);
        assert!(wait_for(|| h.stats.state() == EngineState::Priming, 500));
        assert!(h.stats.snapshot().transmit_errors > 0);
        h.handle.stop();
    }

    #[test]
    fn flush_request_discards_buffered_audio() {
        let mut h = start_harness(64, 1 << 20); // watermark never reached
        h.shared.stream_active.store(true, Ordering::Release);
        h.ring.push(&vec![0x42u8; 2048]);

        h.shared.flush_requested.store(true, Ordering::Release);
        assert!(wait_for(|| h.ring.available() == 0, 500));
        h.handle.stop();
    }
}
