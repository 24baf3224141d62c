//! Stream format descriptors
//!
//! The set of formats is closed: the producer adapter dispatches on these
//! tags and the consumer never looks at them. Descriptors live with the
//! active stream and change only at track boundaries.

use serde::{Deserialize, Serialize};

use crate::constants::{DSD_SILENCE_BYTE, PCM_SILENCE_BYTE};

/// Sample encoding as declared by the upstream decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    /// 16-bit little-endian PCM
    S16Le,
    /// 24-bit payload in a 32-bit container, LSB-aligned (byte 3 padding)
    S24P32Lsb,
    /// 24-bit payload in a 32-bit container, MSB-aligned (byte 0 padding)
    S24P32Msb,
    /// Packed 24-bit little-endian PCM, already wire-shaped
    S24Le,
    /// 32-bit little-endian PCM, already wire-shaped
    S32Le,
    /// DSD, 8 one-bit samples per byte, planar per channel
    DsdU8,
}

impl SampleFormat {
    /// Bytes per sample as delivered by the decoder
    pub fn source_sample_bytes(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le => 3,
            SampleFormat::S24P32Lsb | SampleFormat::S24P32Msb | SampleFormat::S32Le => 4,
            SampleFormat::DsdU8 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::S16Le => "S16_LE",
            SampleFormat::S24P32Lsb => "S24_P32_LSB",
            SampleFormat::S24P32Msb => "S24_P32_MSB",
            SampleFormat::S24Le => "S24_LE",
            SampleFormat::S32Le => "S32_LE",
            SampleFormat::DsdU8 => "DSD_U8",
        }
    }
}

/// Byte/bit transform applied while interleaving planar DSD.
///
/// Which variant applies depends on the bit and byte order the target
/// expects versus what the decoder produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DsdLayout {
    #[default]
    Passthrough,
    /// Reverse the 8 bits of every byte (MSB-first target)
    BitReverse,
    /// Reverse byte order within each 4-byte group
    ByteSwap,
    /// Both transforms
    BitReverseSwap,
}

/// Format descriptor for the active stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_format: SampleFormat,
    pub channels: u16,
    /// Frame rate for PCM, byte rate per channel × 8 for DSD
    pub rate: u32,
    /// Only meaningful when `sample_format` is `DsdU8`
    pub dsd_layout: DsdLayout,
}

impl StreamFormat {
    pub fn pcm(sample_format: SampleFormat, channels: u16, rate: u32) -> Self {
        Self {
            sample_format,
            channels,
            rate,
            dsd_layout: DsdLayout::Passthrough,
        }
    }

    pub fn dsd(channels: u16, rate: u32, dsd_layout: DsdLayout) -> Self {
        Self {
            sample_format: SampleFormat::DsdU8,
            channels,
            rate,
            dsd_layout,
        }
    }

    pub fn is_dsd(&self) -> bool {
        self.sample_format == SampleFormat::DsdU8
    }

    /// Byte written into under-run padding and used as the ring fill value
    pub fn silence_byte(&self) -> u8 {
        if self.is_dsd() {
            DSD_SILENCE_BYTE
        } else {
            PCM_SILENCE_BYTE
        }
    }

    /// Source-frame alignment the push entry points require, in bytes
    pub fn frame_align(&self) -> usize {
        match self.sample_format {
            SampleFormat::DsdU8 => 4 * self.channels as usize,
            f => f.source_sample_bytes() * self.channels.max(1) as usize,
        }
    }
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_dsd() {
            write!(
                f,
                "{} {}ch {}Hz ({:?})",
                self.sample_format.name(),
                self.channels,
                self.rate,
                self.dsd_layout
            )
        } else {
            write!(f, "{} {}ch {}Hz", self.sample_format.name(), self.channels, self.rate)
        }
    }
}
