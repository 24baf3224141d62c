//! Lock-free SPSC byte ring with in-place format conversion
//!
//! The decoder-facing side pushes source bytes through a format-specific
//! entry point which converts into a pre-allocated staging region and then
//! bulk-copies into the FIFO; the transmit side pops wire-ready bytes at a
//! fixed cadence. No mutex is ever taken and nothing allocates after
//! construction: the producer owns `head`, the consumer owns `tail`, and
//! each publishes its counter with a release store the other side observes
//! with an acquire load.

use std::alloc::{alloc, dealloc, Layout};
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::audio::convert::{
    convert_16_to_24, convert_16_to_32, convert_24bit_packed, convert_24bit_packed_shifted,
    interleave_dsd_groups,
};
use crate::audio::copy::copy_audio_fixed;
use crate::audio::format::DsdLayout;
use crate::constants::{STAGING_ALIGN, STAGING_REGION_BYTES};
use crate::error::AudioError;

/// Fixed byte region with explicit alignment, allocated once and never
/// moved or resized.
struct AlignedRegion {
    ptr: *mut u8,
    layout: Layout,
}

impl AlignedRegion {
    fn new(size: usize, align: usize, fill: u8) -> Result<Self, AudioError> {
        let layout = Layout::from_size_align(size, align)
            .map_err(|_| AudioError::StagingAlloc { size, align })?;
        // SAFETY: layout has non-zero size; null return is handled.
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            return Err(AudioError::StagingAlloc { size, align });
        }
        unsafe { std::ptr::write_bytes(ptr, fill, size) };
        Ok(Self { ptr, layout })
    }

    fn len(&self) -> usize {
        self.layout.size()
    }

    fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// # Safety
    ///
    /// The caller must be the only thread touching this region for the
    /// lifetime of the returned slice.
    #[allow(clippy::mut_from_ref)]
    unsafe fn slice_mut(&self) -> &mut [u8] {
        slice::from_raw_parts_mut(self.ptr, self.layout.size())
    }
}

impl Drop for AlignedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/layout came from the matching alloc in new().
        unsafe { dealloc(self.ptr, self.layout) };
    }
}

/// SPSC byte FIFO for the renderer data path.
///
/// Capacity is rounded up to a power of two (floor 4) and one slot is
/// reserved as the full/empty sentinel, so `capacity - 1` bytes are
/// usable. Exactly one producer and one consumer may touch the ring at a
/// time; handing either role to another thread requires external
/// synchronization outside the hot path.
pub struct AudioRing {
    storage: AlignedRegion,
    capacity: usize,
    mask: usize,

    /// Producer write counter, monotonically increasing, masked on index
    head: AtomicUsize,
    /// Consumer read counter, monotonically increasing, masked on index
    tail: AtomicUsize,

    staging_24bit_pack: AlignedRegion,
    staging_16_to_32: AlignedRegion,
    staging_dsd: AlignedRegion,
}

// SAFETY: the storage region is only written through the producer-owned
// [head, head+n) window and only read through the consumer-owned
// [tail, tail+n) window; the windows are disjoint by the counter
// invariant and writes are published with Release before the other side
// Acquire-loads the counter. Staging regions are producer-private.
unsafe impl Send for AudioRing {}
unsafe impl Sync for AudioRing {}

/// Thread-safe handle to a ring shared between producer and consumer
pub type SharedAudioRing = Arc<AudioRing>;

impl AudioRing {
    /// Create a ring of at least `requested_capacity` bytes, pre-filled
    /// with `fill_value` (PCM silence `0x00` or DSD idle `0x69`).
    ///
    /// Allocation failure here is fatal to startup; the hot path never
    /// allocates again.
    pub fn new(requested_capacity: usize, fill_value: u8) -> Result<Self, AudioError> {
        let capacity = requested_capacity.max(4).next_power_of_two();

        Ok(Self {
            storage: AlignedRegion::new(capacity, STAGING_ALIGN, fill_value)?,
            capacity,
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            staging_24bit_pack: AlignedRegion::new(STAGING_REGION_BYTES, STAGING_ALIGN, 0)?,
            staging_16_to_32: AlignedRegion::new(STAGING_REGION_BYTES, STAGING_ALIGN, 0)?,
            staging_dsd: AlignedRegion::new(STAGING_REGION_BYTES, STAGING_ALIGN, 0)?,
        })
    }

    /// Rounded capacity in bytes
    pub fn size(&self) -> usize {
        self.capacity
    }

    /// Bytes currently readable
    pub fn available(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    /// Bytes currently writable (one slot is the SPSC sentinel)
    pub fn free_space(&self) -> usize {
        self.capacity - 1 - self.available()
    }

    /// Copy up to `src.len()` bytes into the FIFO. Returns the short
    /// count when the ring cannot take everything; never blocks.
    pub fn push(&self, src: &[u8]) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let used = head.wrapping_sub(tail);
        let n = src.len().min(self.capacity - 1 - used);
        if n == 0 {
            return 0;
        }

        let idx = head & self.mask;
        let first = n.min(self.capacity - idx);
        // SAFETY: [idx, idx+first) and the wrapped [0, n-first) lie inside
        // the free window owned by the producer; the consumer will not
        // read them until the Release store below.
        unsafe {
            let base = self.storage.ptr;
            copy_audio_fixed(slice::from_raw_parts_mut(base.add(idx), first), &src[..first], first);
            if n > first {
                copy_audio_fixed(slice::from_raw_parts_mut(base, n - first), &src[first..n], n - first);
            }
        }

        self.head.store(head.wrapping_add(n), Ordering::Release);
        n
    }

    /// Read up to `dst.len()` bytes from the FIFO. Returns the short
    /// count when fewer bytes are available; never blocks.
    pub fn pop(&self, dst: &mut [u8]) -> usize {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        let n = dst.len().min(head.wrapping_sub(tail));
        if n == 0 {
            return 0;
        }

        let idx = tail & self.mask;
        let first = n.min(self.capacity - idx);
        // SAFETY: [idx, idx+first) and the wrapped remainder lie inside
        // the readable window owned by the consumer; the producer will
        // not overwrite them until the Release store below.
        unsafe {
            let base = self.storage.as_ptr();
            copy_audio_fixed(&mut dst[..first], slice::from_raw_parts(base.add(idx), first), first);
            if n > first {
                copy_audio_fixed(&mut dst[first..n], slice::from_raw_parts(base, n - first), n - first);
            }
        }

        self.tail.store(tail.wrapping_add(n), Ordering::Release);
        n
    }

    /// Push S24_P32 LSB-aligned samples, packing to 24-bit on the way in.
    ///
    /// `src.len()` must be a multiple of 4 (returns 0 otherwise).
    /// Consumption is all-or-nothing at sample granularity: when fewer
    /// packed bytes fit, proportionally fewer whole samples are consumed.
    /// Returns source bytes consumed.
    pub fn push_24bit_packed(&self, src: &[u8]) -> usize {
        self.staged_push_pcm(src, 4, 3, &self.staging_24bit_pack, convert_24bit_packed)
    }

    /// As [`push_24bit_packed`](Self::push_24bit_packed) for MSB-aligned
    /// input (padding byte in position 0).
    pub fn push_24bit_packed_shifted(&self, src: &[u8]) -> usize {
        self.staged_push_pcm(src, 4, 3, &self.staging_24bit_pack, convert_24bit_packed_shifted)
    }

    /// Push S16 samples widened to S32 (ring output is 2× input).
    /// `src.len()` must be a multiple of 2. Returns source bytes consumed.
    pub fn push_16_to_32(&self, src: &[u8]) -> usize {
        self.staged_push_pcm(src, 2, 4, &self.staging_16_to_32, convert_16_to_32)
    }

    /// Push S16 samples widened to packed 24-bit (ring output is 1.5×
    /// input). Shares `staging_24bit_pack` with the 24-bit paths, which is
    /// sound because push entry points are serialized on the single
    /// producer and staging holds no state between calls.
    pub fn push_16_to_24(&self, src: &[u8]) -> usize {
        self.staged_push_pcm(src, 2, 3, &self.staging_24bit_pack, convert_16_to_24)
    }

    /// Push planar DSD, interleaving into 4-byte channel groups with the
    /// layout's bit/byte transform. Output size equals input size.
    ///
    /// Input not aligned to 4 bytes per channel is rejected (returns 0).
    /// A planar source cannot be split mid-call without shearing the
    /// channel planes, so this entry is also all-or-nothing against free
    /// space: it returns 0 when the whole frame does not fit.
    pub fn push_dsd_planar(&self, src: &[u8], channels: u16, layout: DsdLayout) -> usize {
        let channels = channels as usize;
        let group_bytes = 4 * channels;
        if channels == 0 || src.is_empty() || src.len() % group_bytes != 0 {
            return 0;
        }
        if self.free_space() < src.len() {
            return 0;
        }

        let bpc = src.len() / channels;
        let total_groups = bpc / 4;
        let max_groups = STAGING_REGION_BYTES / group_bytes;

        let mut done = 0;
        while done < total_groups {
            let chunk = (total_groups - done).min(max_groups);
            // SAFETY: staging_dsd is touched only by the producer and only
            // inside this call.
            let stage = unsafe { self.staging_dsd.slice_mut() };
            interleave_dsd_groups(stage, src, channels, bpc, done, chunk, layout);
            let out_len = chunk * group_bytes;
            let pushed = self.push(&stage[..out_len]);
            debug_assert_eq!(pushed, out_len);
            done += chunk;
        }

        src.len()
    }

    /// Convert-then-push shared by the PCM entry points: check the sample
    /// alignment contract, clamp to whole samples that fit, and stream
    /// through the staging region in chunks.
    fn staged_push_pcm(
        &self,
        src: &[u8],
        in_sample: usize,
        out_sample: usize,
        staging: &AlignedRegion,
        convert: fn(&mut [u8], &[u8], usize) -> usize,
    ) -> usize {
        if src.is_empty() || src.len() % in_sample != 0 {
            return 0;
        }

        let samples = src.len() / in_sample;
        // free_space only grows under our feet (the consumer can pop but
        // nothing else pushes), so this clamp stays valid below.
        let fit = samples.min(self.free_space() / out_sample);
        if fit == 0 {
            return 0;
        }

        let max_per_chunk = staging.len() / out_sample;
        let mut done = 0;
        while done < fit {
            let chunk = (fit - done).min(max_per_chunk);
            // SAFETY: the staging region is touched only by the producer
            // and only inside this call.
            let stage = unsafe { staging.slice_mut() };
            let out_len = convert(&mut stage[..], &src[done * in_sample..], chunk);
            let pushed = self.push(&stage[..out_len]);
            debug_assert_eq!(pushed, out_len);
            done += chunk;
        }

        fit * in_sample
    }
}

/// Create a shared ring handle
pub fn create_shared_ring(requested_capacity: usize, fill_value: u8) -> Result<SharedAudioRing, AudioError> {
    Ok(Arc::new(AudioRing::new(requested_capacity, fill_value)?))
}
