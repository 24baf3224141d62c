//! Transmit sink boundary
//!
//! The Diretta wire protocol lives behind this trait: the cadence loop
//! hands it one conversion-ready packet per cycle and nothing else. The
//! UDP sink binds its socket at startup, before privileges are dropped,
//! so worker threads can keep using it without capability bits.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::error::NetworkError;

/// Largest payload the UDP sink will frame into one datagram
pub const MAX_SINK_PAYLOAD: usize = 65_000;

/// Destination for wire-ready audio packets.
///
/// Implementations must not block longer than a fraction of the cadence
/// cycle; a failed send is reported, not retried, and the cadence loop
/// decides what to do with the stream.
pub trait TransmitSink: Send {
    fn send_packet(&mut self, payload: &[u8]) -> Result<(), NetworkError>;
}

/// Counters shared with the diagnostics side
#[derive(Debug, Default)]
pub struct SinkStats {
    pub packets_sent: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub send_errors: AtomicU64,
}

/// UDP transmit sink with a small sequence header per datagram
pub struct UdpTransmitSink {
    socket: UdpSocket,
    sequence: u32,
    /// Reused header+payload scratch; sized once at startup
    frame: BytesMut,
    stats: Arc<SinkStats>,
}

impl UdpTransmitSink {
    /// Bind a local socket and connect it to the target. Must be called
    /// before the process drops privileges.
    pub fn new(target: SocketAddr) -> Result<Self, NetworkError> {
        let bind_addr: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse().unwrap()
        } else {
            "[::]:0".parse().unwrap()
        };
        let socket = UdpSocket::bind(bind_addr)
            .map_err(|e| NetworkError::BindFailed(e.to_string()))?;
        socket
            .connect(target)
            .map_err(|e| NetworkError::ConnectFailed(e.to_string()))?;

        Ok(Self {
            socket,
            sequence: 0,
            frame: BytesMut::with_capacity(MAX_SINK_PAYLOAD + 12),
            stats: Arc::new(SinkStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<SinkStats> {
        self.stats.clone()
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed(e.to_string()))
    }
}

impl TransmitSink for UdpTransmitSink {
    fn send_packet(&mut self, payload: &[u8]) -> Result<(), NetworkError> {
        if payload.len() > MAX_SINK_PAYLOAD {
            return Err(NetworkError::PacketTooLarge(payload.len()));
        }

        // Datagram: [magic u32 | sequence u32 | length u32 | payload]
        self.frame.clear();
        self.frame.put_u32(0x4452_5441); // "DRTA"
        self.frame.put_u32(self.sequence);
        self.frame.put_u32(payload.len() as u32);
        self.frame.put_slice(payload);

        match self.socket.send(&self.frame) {
            Ok(_) => {
                self.sequence = self.sequence.wrapping_add(1);
                self.stats.packets_sent.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .bytes_sent
                    .fetch_add(self.frame.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                Err(NetworkError::SendFailed(e.to_string()))
            }
        }
    }
}

/// Sink that discards every packet; used when no target is configured
#[derive(Debug, Default)]
pub struct NullSink {
    pub packets: u64,
}

impl TransmitSink for NullSink {
    fn send_packet(&mut self, _payload: &[u8]) -> Result<(), NetworkError> {
        self.packets += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udp_sink_frames_and_counts() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(std::time::Duration::from_secs(2)))
            .unwrap();
        let target = receiver.local_addr().unwrap();

        let mut sink = UdpTransmitSink::new(target).unwrap();
        let stats = sink.stats();

        sink.send_packet(&[0x69; 32]).unwrap();
        sink.send_packet(&[0x00; 32]).unwrap();

        let mut buf = [0u8; 128];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(len, 44);
        assert_eq!(&buf[..4], &0x4452_5441u32.to_be_bytes());
        assert_eq!(&buf[4..8], &0u32.to_be_bytes());
        assert_eq!(&buf[8..12], &32u32.to_be_bytes());
        assert!(buf[12..44].iter().all(|&b| b == 0x69));

        let (_, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(&buf[4..8], &1u32.to_be_bytes());

        assert_eq!(stats.packets_sent.load(Ordering::Relaxed), 2);
        assert_eq!(stats.bytes_sent.load(Ordering::Relaxed), 88);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut sink = UdpTransmitSink::new(receiver.local_addr().unwrap()).unwrap();

        let err = sink.send_packet(&vec![0u8; MAX_SINK_PAYLOAD + 1]);
        assert!(matches!(err, Err(NetworkError::PacketTooLarge(_))));
    }
}
