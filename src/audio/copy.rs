//! Fixed-shape audio memory copy
//!
//! The producer copies converted samples into the ring on every frame, so
//! the copy's runtime must be predictable, not just fast on average. This
//! primitive walks the input in unrolled 64-byte blocks of unaligned 64-bit
//! loads and stores, then an 8-byte loop, then a byte tail. No branches
//! depend on the data, no lengths are rounded up, and nothing past `n` is
//! touched, so per-call timing stays flat across the packet sizes the
//! engine uses.

/// Copy `n` bytes from `src` to `dst`.
///
/// Result is identical to a bytewise copy for any alignment of either
/// slice. Panics if either slice is shorter than `n`.
#[inline]
pub fn copy_audio_fixed(dst: &mut [u8], src: &[u8], n: usize) {
    assert!(src.len() >= n && dst.len() >= n, "copy_audio_fixed: slice shorter than n");

    let mut s = src.as_ptr();
    let mut d = dst.as_mut_ptr();
    let mut remaining = n;

    // SAFETY: s and d walk forward through their slices and never cross
    // the `n`-byte bound asserted above. Unaligned loads/stores are used
    // throughout, so no alignment requirement is placed on the caller.
    unsafe {
        while remaining >= 64 {
            let a = (s as *const u64).read_unaligned();
            let b = (s.add(8) as *const u64).read_unaligned();
            let c = (s.add(16) as *const u64).read_unaligned();
            let e = (s.add(24) as *const u64).read_unaligned();
            let f = (s.add(32) as *const u64).read_unaligned();
            let g = (s.add(40) as *const u64).read_unaligned();
            let h = (s.add(48) as *const u64).read_unaligned();
            let i = (s.add(56) as *const u64).read_unaligned();
            (d as *mut u64).write_unaligned(a);
            (d.add(8) as *mut u64).write_unaligned(b);
            (d.add(16) as *mut u64).write_unaligned(c);
            (d.add(24) as *mut u64).write_unaligned(e);
            (d.add(32) as *mut u64).write_unaligned(f);
            (d.add(40) as *mut u64).write_unaligned(g);
            (d.add(48) as *mut u64).write_unaligned(h);
            (d.add(56) as *mut u64).write_unaligned(i);
            s = s.add(64);
            d = d.add(64);
            remaining -= 64;
        }

        while remaining >= 8 {
            let w = (s as *const u64).read_unaligned();
            (d as *mut u64).write_unaligned(w);
            s = s.add(8);
            d = d.add(8);
            remaining -= 8;
        }

        while remaining > 0 {
            *d = *s;
            s = s.add(1);
            d = d.add(1);
            remaining -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const TEST_SIZES: [usize; 9] = [128, 180, 256, 512, 768, 1024, 1500, 2048, 4096];

    #[test]
    fn matches_bytewise_copy() {
        for &size in &TEST_SIZES {
            let src: Vec<u8> = (0..size).map(|i| (i & 0xFF) as u8).collect();
            let mut dst = vec![0xAAu8; size];

            copy_audio_fixed(&mut dst, &src, size);

            assert_eq!(dst, src, "mismatch at size {size}");
        }
    }

    #[test]
    fn correct_at_odd_alignments() {
        // Shift both ends off the natural alignment of the backing Vec.
        let backing: Vec<u8> = (0..4200).map(|i| (i % 251) as u8).collect();
        let mut out = vec![0u8; 4200];

        for offset in 1..8 {
            let n = 1500;
            let src = &backing[offset..offset + n];
            let dst = &mut out[offset + 3..offset + 3 + n];
            copy_audio_fixed(dst, src, n);
            assert_eq!(&dst[..], src, "mismatch at offset {offset}");
        }
    }

    #[test]
    fn never_writes_past_n() {
        let src = vec![0x5Au8; 256];
        let mut dst = vec![0xEEu8; 256];

        copy_audio_fixed(&mut dst, &src, 180);

        assert!(dst[..180].iter().all(|&b| b == 0x5A));
        assert!(dst[180..].iter().all(|&b| b == 0xEE));
    }

    #[test]
    fn timing_variance_is_bounded() {
        // Amortize each measurement over enough inner loops that the clock
        // resolution stops mattering, then check the coefficient of
        // variation over many measurements stays under 0.5.
        const ITERATIONS: usize = 2000;
        const TARGET_US: f64 = 50.0;

        for &size in &[180usize, 768, 1536] {
            let src = vec![0x5Au8; 4096];
            let mut dst = vec![0u8; 4096];

            let mut measure = |loops: usize| -> f64 {
                let start = Instant::now();
                for _ in 0..loops {
                    copy_audio_fixed(&mut dst, &src, size);
                }
                start.elapsed().as_secs_f64() * 1e6
            };

            let mut inner = 1usize;
            while inner < 1 << 20 && measure(inner) < TARGET_US {
                inner <<= 1;
            }

            for _ in 0..20 {
                measure(inner);
            }

            let samples: Vec<f64> = (0..ITERATIONS).map(|_| measure(inner) / inner as f64).collect();
            let mean = samples.iter().sum::<f64>() / samples.len() as f64;
            let var = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>()
                / samples.len() as f64;
            let cv = var.sqrt() / mean;

            assert!(cv < 0.5, "timing variance too high for size {size} (cv={cv:.3}, mean={mean:.3}us)");
        }
    }
}
