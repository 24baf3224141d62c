//! Renderer configuration

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BUFFER_SECONDS, DEFAULT_CYCLE_TIME_US, DEFAULT_DIAG_PORT, DEFAULT_PACKET_BYTES,
    MAX_CYCLE_TIME_US, MIN_CYCLE_TIME_US, MIN_RECOMMENDED_BUFFER_SECONDS,
    PEAK_STREAM_BYTES_PER_SEC,
};
use crate::engine::WireWidth;
use crate::error::{Error, Result};
use crate::network::sink::MAX_SINK_PAYLOAD;

/// Top-level renderer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Friendly device name shown to control points
    pub name: String,

    /// Ring depth in seconds of audio at the peak supported rate
    pub buffer_seconds: f64,

    /// Transmit cycle period in microseconds
    pub cycle_time_us: u64,

    /// Bytes handed to the transmit sink per cycle; derived from the
    /// negotiated MTU and cycle time by the caller
    pub packet_bytes: usize,

    /// Diretta target address; `None` discards packets (bench mode)
    pub target: Option<SocketAddr>,

    /// PCM word width the target consumes
    pub wire_width: WireWidth,

    /// Unprivileged user to switch to after sockets are bound
    pub runtime_user: Option<String>,

    pub diag: DiagConfig,
}

/// Diagnostics HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            name: "Diretta Renderer".to_string(),
            buffer_seconds: DEFAULT_BUFFER_SECONDS,
            cycle_time_us: DEFAULT_CYCLE_TIME_US,
            packet_bytes: DEFAULT_PACKET_BYTES,
            target: None,
            wire_width: WireWidth::default(),
            runtime_user: None,
            diag: DiagConfig::default(),
        }
    }
}

impl Default for DiagConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0".to_string(),
            http_port: DEFAULT_DIAG_PORT,
        }
    }
}

impl RendererConfig {
    /// Check option ranges; called once at startup before anything is
    /// allocated.
    pub fn validate(&self) -> Result<()> {
        if !(self.buffer_seconds.is_finite() && self.buffer_seconds > 0.0) {
            return Err(Error::Config(format!(
                "buffer_seconds must be positive, got {}",
                self.buffer_seconds
            )));
        }
        if self.buffer_seconds < MIN_RECOMMENDED_BUFFER_SECONDS {
            tracing::warn!(
                "buffer < {MIN_RECOMMENDED_BUFFER_SECONDS} seconds may cause issues with DSD/Hi-Res"
            );
        }

        if !(MIN_CYCLE_TIME_US..=MAX_CYCLE_TIME_US).contains(&self.cycle_time_us) {
            return Err(Error::Config(format!(
                "cycle_time_us must be in [{MIN_CYCLE_TIME_US}, {MAX_CYCLE_TIME_US}], got {}",
                self.cycle_time_us
            )));
        }

        if self.packet_bytes == 0 || self.packet_bytes > MAX_SINK_PAYLOAD {
            return Err(Error::Config(format!(
                "packet_bytes must be in [1, {MAX_SINK_PAYLOAD}], got {}",
                self.packet_bytes
            )));
        }

        Ok(())
    }

    /// Requested ring capacity: `buffer_seconds` worth of the peak
    /// supported stream rate. The ring rounds this up to a power of two.
    pub fn ring_capacity_bytes(&self) -> usize {
        (self.buffer_seconds * PEAK_STREAM_BYTES_PER_SEC as f64).ceil() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.name, "Diretta Renderer");
    }

    #[test]
    fn cycle_time_range_is_enforced() {
        let mut config = RendererConfig::default();

        config.cycle_time_us = 332;
        assert!(config.validate().is_err());

        config.cycle_time_us = 10_001;
        assert!(config.validate().is_err());

        config.cycle_time_us = 333;
        assert!(config.validate().is_ok());
        config.cycle_time_us = 10_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn nonsense_values_are_rejected() {
        let mut config = RendererConfig::default();
        config.buffer_seconds = 0.0;
        assert!(config.validate().is_err());

        let mut config = RendererConfig::default();
        config.packet_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn capacity_scales_with_buffer_seconds() {
        let mut config = RendererConfig::default();
        config.buffer_seconds = 2.0;
        assert_eq!(config.ring_capacity_bytes(), 12_288_000);

        config.buffer_seconds = 0.5;
        assert_eq!(config.ring_capacity_bytes(), 3_072_000);
    }
}
