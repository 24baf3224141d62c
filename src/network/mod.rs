//! Transmit-side network boundary

pub mod sink;

pub use sink::{NullSink, TransmitSink, UdpTransmitSink};
