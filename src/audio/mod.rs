//! Audio data-path primitives

pub mod convert;
pub mod copy;
pub mod format;
pub mod ring;

pub use copy::copy_audio_fixed;
pub use format::{DsdLayout, SampleFormat, StreamFormat};
pub use ring::{create_shared_ring, AudioRing, SharedAudioRing};
