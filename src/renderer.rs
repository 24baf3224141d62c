//! Renderer facade
//!
//! Owns the ring, the transmit sink and the cadence thread, and hands
//! out the single producer-side writer. Shutdown is a message (`stop()`
//! flips a flag and joins), never work done inside a signal handler.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::audio::format::StreamFormat;
use crate::audio::ring::{create_shared_ring, SharedAudioRing};
use crate::config::RendererConfig;
use crate::constants::{PCM_SILENCE_BYTE, UNDERRUN_REPRIME_THRESHOLD};
use crate::engine::consumer::{CadenceConfig, CadenceHandle, CadenceLoop};
use crate::engine::producer::StreamWriter;
use crate::engine::stats::EngineStats;
use crate::engine::EngineShared;
use crate::error::{Error, Result};
use crate::network::sink::{NullSink, TransmitSink, UdpTransmitSink};

/// How long a format transition may wait for the ring to drain before
/// escalating to a hard drain.
const FORMAT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Process-wide renderer instance
pub struct DirettaRenderer {
    config: RendererConfig,
    ring: SharedAudioRing,
    shared: Arc<EngineShared>,
    stats: Arc<EngineStats>,
    space_tx: Sender<()>,
    /// Taken by the single stream writer
    space_rx: Option<Receiver<()>>,
    cadence: Option<CadenceHandle>,
}

impl DirettaRenderer {
    /// Allocate the ring and staging regions. Allocation failure here is
    /// the only fatal error class of the audio path.
    pub fn new(config: RendererConfig) -> Result<Self> {
        config.validate()?;

        let ring = create_shared_ring(config.ring_capacity_bytes(), PCM_SILENCE_BYTE)?;
        tracing::info!(
            requested = config.ring_capacity_bytes(),
            actual = ring.size(),
            "ring allocated"
        );

        let (space_tx, space_rx) = bounded(1);

        Ok(Self {
            config,
            ring,
            shared: Arc::new(EngineShared::new()),
            stats: Arc::new(EngineStats::new()),
            space_tx,
            space_rx: Some(space_rx),
            cadence: None,
        })
    }

    /// Bind the transmit socket and start the cadence thread. Must run
    /// before privileges are dropped so the socket is bound as root.
    pub fn start(&mut self) -> Result<()> {
        if self.cadence.is_some() {
            return Ok(());
        }
        self.shared
            .running
            .store(true, std::sync::atomic::Ordering::Release);

        let sink: Box<dyn TransmitSink> = match self.config.target {
            Some(addr) => {
                let sink = UdpTransmitSink::new(addr)?;
                tracing::info!(dest = %addr, local = ?sink.local_addr().ok(), "transmit sink bound");
                Box::new(sink)
            }
            None => {
                tracing::warn!("no target configured, packets will be discarded");
                Box::new(NullSink::default())
            }
        };

        let cadence_config = CadenceConfig {
            cycle: Duration::from_micros(self.config.cycle_time_us),
            packet_bytes: self.config.packet_bytes,
            prime_watermark: self.config.ring_capacity_bytes() / 2,
            reprime_threshold: UNDERRUN_REPRIME_THRESHOLD,
        };

        let handle = CadenceLoop::spawn(
            self.ring.clone(),
            sink,
            cadence_config,
            self.shared.clone(),
            self.stats.clone(),
            self.space_tx.clone(),
        )?;
        self.cadence = Some(handle);

        tracing::info!(name = %self.config.name, "renderer started");
        Ok(())
    }

    /// Hand out the producer-side writer. The ring is single-producer,
    /// so this succeeds exactly once.
    pub fn writer(&mut self, initial_format: StreamFormat) -> Result<StreamWriter> {
        let space_rx = self
            .space_rx
            .take()
            .ok_or_else(|| Error::Config("stream writer already taken".into()))?;

        Ok(StreamWriter::new(
            self.ring.clone(),
            self.shared.clone(),
            self.stats.clone(),
            space_rx,
            initial_format,
            self.config.wire_width,
            self.config.packet_bytes,
            FORMAT_DRAIN_TIMEOUT,
        ))
    }

    /// Stop the cadence thread and release the sink
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.cadence.take() {
            handle.stop();
            tracing::info!("renderer stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.cadence.as_ref().map(CadenceHandle::is_running).unwrap_or(false)
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<EngineStats> {
        self.stats.clone()
    }

    pub fn ring(&self) -> SharedAudioRing {
        self.ring.clone()
    }
}

impl Drop for DirettaRenderer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::format::{SampleFormat, StreamFormat};
    use crate::engine::stats::EngineState;
    use std::time::Instant;

    fn test_config() -> RendererConfig {
        RendererConfig {
            buffer_seconds: 0.001, // tiny ring so tests prime quickly
            cycle_time_us: 500,
            packet_bytes: 64,
            target: None,
            ..RendererConfig::default()
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F, ms: u64) -> bool {
        let deadline = Instant::now() + Duration::from_millis(ms);
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }

    #[test]
    fn full_lifecycle_streams_and_drains() {
        let mut renderer = DirettaRenderer::new(test_config()).unwrap();
        renderer.start().unwrap();
        assert!(renderer.is_running());

        let stats = renderer.stats();
        let format = StreamFormat::pcm(SampleFormat::S32Le, 2, 192_000);
        let mut writer = renderer.writer(format).unwrap();

        writer.start_stream();
        let frame = vec![0x3Cu8; 4096];
        writer.write_frame(&frame).unwrap();

        assert!(wait_for(|| stats.snapshot().bytes_popped > 0, 1000));

        writer.finish();
        assert!(wait_for(|| stats.state() == EngineState::Idle, 1000));
        assert_eq!(renderer.ring().available(), 0);

        renderer.stop();
        assert!(!renderer.is_running());
    }

    #[test]
    fn writer_is_single_producer() {
        let mut renderer = DirettaRenderer::new(test_config()).unwrap();
        let format = StreamFormat::pcm(SampleFormat::S16Le, 2, 48_000);

        assert!(renderer.writer(format).is_ok());
        assert!(renderer.writer(format).is_err());
    }

    #[test]
    fn start_is_idempotent() {
        let mut renderer = DirettaRenderer::new(test_config()).unwrap();
        renderer.start().unwrap();
        renderer.start().unwrap();
        renderer.stop();
    }
}
