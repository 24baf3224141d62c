//! Sample format converters
//!
//! Stateless byte-span transforms between the encodings the upstream
//! decoder delivers and what the Diretta target consumes. Each function
//! returns the number of destination bytes produced and never fails;
//! sizing the destination is the caller's contract.

use crate::audio::format::DsdLayout;

/// 256-entry bit-reverse lookup table (`0x01 → 0x80`, `0x80 → 0x01`)
pub(crate) const BIT_REVERSE: [u8; 256] = build_bit_reverse();

const fn build_bit_reverse() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).reverse_bits();
        i += 1;
    }
    table
}

/// S24_P32 LSB-aligned → packed 24-bit.
///
/// Input: `nsamples` four-byte samples, payload in bytes 0–2, byte 3
/// ignored. Output: `3 * nsamples` bytes.
pub fn convert_24bit_packed(dst: &mut [u8], src: &[u8], nsamples: usize) -> usize {
    let out = &mut dst[..nsamples * 3];
    let inp = &src[..nsamples * 4];
    for (o, s) in out.chunks_exact_mut(3).zip(inp.chunks_exact(4)) {
        o.copy_from_slice(&s[..3]);
    }
    nsamples * 3
}

/// S24_P32 MSB-aligned → packed 24-bit.
///
/// Payload in bytes 1–3, byte 0 ignored.
pub fn convert_24bit_packed_shifted(dst: &mut [u8], src: &[u8], nsamples: usize) -> usize {
    let out = &mut dst[..nsamples * 3];
    let inp = &src[..nsamples * 4];
    for (o, s) in out.chunks_exact_mut(3).zip(inp.chunks_exact(4)) {
        o.copy_from_slice(&s[1..4]);
    }
    nsamples * 3
}

/// S16 → S32, sample placed in the upper 16 bits, lower 16 bits zero.
pub fn convert_16_to_32(dst: &mut [u8], src: &[u8], nsamples: usize) -> usize {
    let out = &mut dst[..nsamples * 4];
    let inp = &src[..nsamples * 2];
    for (o, s) in out.chunks_exact_mut(4).zip(inp.chunks_exact(2)) {
        o[0] = 0;
        o[1] = 0;
        o[2] = s[0];
        o[3] = s[1];
    }
    nsamples * 4
}

/// S16 → packed 24-bit, sample in the upper 16 bits of each 24-bit word.
pub fn convert_16_to_24(dst: &mut [u8], src: &[u8], nsamples: usize) -> usize {
    let out = &mut dst[..nsamples * 3];
    let inp = &src[..nsamples * 2];
    for (o, s) in out.chunks_exact_mut(3).zip(inp.chunks_exact(2)) {
        o[0] = 0;
        o[1] = s[0];
        o[2] = s[1];
    }
    nsamples * 3
}

/// Planar DSD → interleaved 4-byte groups.
///
/// `src` holds `channels` planes of `src.len() / channels` bytes each;
/// the output interleaves one 4-byte group per channel in channel order,
/// applying the layout's bit-reverse and/or byte-swap transform. Output
/// length equals input length. `src.len()` must be a multiple of
/// `4 * channels`.
pub fn convert_dsd_planar(dst: &mut [u8], src: &[u8], channels: usize, layout: DsdLayout) -> usize {
    let bpc = src.len() / channels;
    let groups = bpc / 4;
    interleave_dsd_groups(dst, src, channels, bpc, 0, groups, layout);
    groups * channels * 4
}

/// Interleave a sub-range of 4-byte groups from a planar source.
///
/// Writes `group_count * channels * 4` bytes into `dst`. Exposed within
/// the crate so the ring can feed oversized inputs through its staging
/// region in chunks.
pub(crate) fn interleave_dsd_groups(
    dst: &mut [u8],
    src: &[u8],
    channels: usize,
    bpc: usize,
    group_start: usize,
    group_count: usize,
    layout: DsdLayout,
) {
    match layout {
        DsdLayout::Passthrough => {
            interleave_inner::<false, false>(dst, src, channels, bpc, group_start, group_count)
        }
        DsdLayout::BitReverse => {
            interleave_inner::<true, false>(dst, src, channels, bpc, group_start, group_count)
        }
        DsdLayout::ByteSwap => {
            interleave_inner::<false, true>(dst, src, channels, bpc, group_start, group_count)
        }
        DsdLayout::BitReverseSwap => {
            interleave_inner::<true, true>(dst, src, channels, bpc, group_start, group_count)
        }
    }
}

fn interleave_inner<const REV: bool, const SWAP: bool>(
    dst: &mut [u8],
    src: &[u8],
    channels: usize,
    bpc: usize,
    group_start: usize,
    group_count: usize,
) {
    for gi in 0..group_count {
        let g = group_start + gi;
        for ch in 0..channels {
            let plane = &src[ch * bpc + g * 4..ch * bpc + g * 4 + 4];
            let mut group = [plane[0], plane[1], plane[2], plane[3]];
            if SWAP {
                group.reverse();
            }
            if REV {
                group = group.map(|b| BIT_REVERSE[b as usize]);
            }
            let off = (gi * channels + ch) * 4;
            dst[off..off + 4].copy_from_slice(&group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(b: u8) -> u8 {
        BIT_REVERSE[b as usize]
    }

    #[test]
    fn bit_reverse_table_known_pairs() {
        assert_eq!(rev(0x00), 0x00);
        assert_eq!(rev(0x01), 0x80);
        assert_eq!(rev(0x80), 0x01);
        assert_eq!(rev(0xFF), 0xFF);
        assert_eq!(rev(0x69), 0x96);
        for b in 0..=255u8 {
            assert_eq!(rev(rev(b)), b);
        }
    }

    #[test]
    fn pack_24bit_lsb_aligned() {
        const NUM: usize = 64;
        let mut input = [0u8; NUM * 4];
        let mut expected = [0u8; NUM * 3];
        for i in 0..NUM {
            input[i * 4] = 0x33 + i as u8;
            input[i * 4 + 1] = 0x22 + i as u8;
            input[i * 4 + 2] = 0x11 + i as u8;
            input[i * 4 + 3] = 0x00;
            expected[i * 3] = 0x33 + i as u8;
            expected[i * 3 + 1] = 0x22 + i as u8;
            expected[i * 3 + 2] = 0x11 + i as u8;
        }

        let mut output = [0u8; NUM * 3];
        let produced = convert_24bit_packed(&mut output, &input, NUM);

        assert_eq!(produced, NUM * 3);
        assert_eq!(output, expected);
    }

    #[test]
    fn pack_24bit_msb_aligned() {
        const NUM: usize = 64;
        let mut input = [0u8; NUM * 4];
        let mut expected = [0u8; NUM * 3];
        for i in 0..NUM {
            input[i * 4] = 0x00;
            input[i * 4 + 1] = 0x33 + i as u8;
            input[i * 4 + 2] = 0x22 + i as u8;
            input[i * 4 + 3] = 0x11 + i as u8;
            expected[i * 3] = 0x33 + i as u8;
            expected[i * 3 + 1] = 0x22 + i as u8;
            expected[i * 3 + 2] = 0x11 + i as u8;
        }

        let mut output = [0u8; NUM * 3];
        let produced = convert_24bit_packed_shifted(&mut output, &input, NUM);

        assert_eq!(produced, NUM * 3);
        assert_eq!(output, expected);
    }

    #[test]
    fn pack_24bit_single_sample() {
        let input = [0xAB, 0xCD, 0xEF, 0x00];
        let mut output = [0u8; 3];
        let produced = convert_24bit_packed(&mut output, &input, 1);
        assert_eq!(produced, 3);
        assert_eq!(output, [0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn widen_16_to_32() {
        let input = [0xAB, 0xCD];
        let mut output = [0u8; 4];
        let produced = convert_16_to_32(&mut output, &input, 1);
        assert_eq!(produced, 4);
        assert_eq!(output, [0x00, 0x00, 0xAB, 0xCD]);
    }

    #[test]
    fn widen_16_to_32_many() {
        const NUM: usize = 64;
        let mut input = [0u8; NUM * 2];
        for i in 0..NUM {
            input[i * 2] = i as u8;
            input[i * 2 + 1] = (i as u8).wrapping_add(0x80);
        }

        let mut output = [0u8; NUM * 4];
        convert_16_to_32(&mut output, &input, NUM);

        for i in 0..NUM {
            assert_eq!(output[i * 4], 0);
            assert_eq!(output[i * 4 + 1], 0);
            assert_eq!(output[i * 4 + 2], input[i * 2]);
            assert_eq!(output[i * 4 + 3], input[i * 2 + 1]);
        }
    }

    #[test]
    fn widen_16_to_24() {
        const NUM: usize = 64;
        let mut input = [0u8; NUM * 2];
        for i in 0..NUM {
            input[i * 2] = i as u8;
            input[i * 2 + 1] = (i as u8).wrapping_add(0x80);
        }

        let mut output = [0u8; NUM * 3];
        let produced = convert_16_to_24(&mut output, &input, NUM);

        assert_eq!(produced, NUM * 3);
        for i in 0..NUM {
            assert_eq!(output[i * 3], 0);
            assert_eq!(output[i * 3 + 1], input[i * 2]);
            assert_eq!(output[i * 3 + 2], input[i * 2 + 1]);
        }
    }

    fn stereo_dsd_input(bpc: usize) -> Vec<u8> {
        let mut input = vec![0u8; bpc * 2];
        for i in 0..bpc {
            input[i] = i as u8;
            input[bpc + i] = 0xFFu8.wrapping_sub(i as u8);
        }
        input
    }

    #[test]
    fn dsd_passthrough_interleave() {
        const BPC: usize = 64;
        let input = stereo_dsd_input(BPC);
        let mut output = vec![0u8; BPC * 2];

        let produced = convert_dsd_planar(&mut output, &input, 2, DsdLayout::Passthrough);

        assert_eq!(produced, BPC * 2);
        for i in 0..BPC / 4 {
            for b in 0..4 {
                assert_eq!(output[i * 8 + b], (i * 4 + b) as u8);
                assert_eq!(output[i * 8 + 4 + b], 0xFF - (i * 4 + b) as u8);
            }
        }
    }

    #[test]
    fn dsd_bit_reverse_interleave() {
        const BPC: usize = 64;
        let input = stereo_dsd_input(BPC);
        let mut output = vec![0u8; BPC * 2];

        convert_dsd_planar(&mut output, &input, 2, DsdLayout::BitReverse);

        for i in 0..BPC / 4 {
            for b in 0..4 {
                assert_eq!(output[i * 8 + b], rev(input[i * 4 + b]));
                assert_eq!(output[i * 8 + 4 + b], rev(input[BPC + i * 4 + b]));
            }
        }
    }

    #[test]
    fn dsd_byte_swap_interleave() {
        const BPC: usize = 64;
        let input = stereo_dsd_input(BPC);
        let mut output = vec![0u8; BPC * 2];

        convert_dsd_planar(&mut output, &input, 2, DsdLayout::ByteSwap);

        for i in 0..BPC / 4 {
            for b in 0..4 {
                assert_eq!(output[i * 8 + b], input[i * 4 + (3 - b)]);
                assert_eq!(output[i * 8 + 4 + b], input[BPC + i * 4 + (3 - b)]);
            }
        }
    }

    #[test]
    fn dsd_bit_reverse_swap_interleave() {
        const BPC: usize = 64;
        let input = stereo_dsd_input(BPC);
        let mut output = vec![0u8; BPC * 2];

        convert_dsd_planar(&mut output, &input, 2, DsdLayout::BitReverseSwap);

        for i in 0..BPC / 4 {
            for b in 0..4 {
                assert_eq!(output[i * 8 + b], rev(input[i * 4 + (3 - b)]));
                assert_eq!(output[i * 8 + 4 + b], rev(input[BPC + i * 4 + (3 - b)]));
            }
        }
    }

    #[test]
    fn dsd_small_input_scalar_tail() {
        // 8 bytes per channel, below any wide-block width
        const BPC: usize = 8;
        let mut input = vec![0u8; BPC * 2];
        for i in 0..BPC {
            input[i] = 0x10 + i as u8;
            input[BPC + i] = 0xA0 + i as u8;
        }
        let mut output = vec![0u8; BPC * 2];

        let produced = convert_dsd_planar(&mut output, &input, 2, DsdLayout::Passthrough);

        assert_eq!(produced, BPC * 2);
        for i in 0..BPC / 4 {
            for b in 0..4 {
                assert_eq!(output[i * 8 + b], input[i * 4 + b]);
                assert_eq!(output[i * 8 + 4 + b], input[BPC + i * 4 + b]);
            }
        }
    }

    #[test]
    fn dsd_mono_applies_transform_without_interleave() {
        let input: Vec<u8> = (0..16).collect();
        let mut output = vec![0u8; 16];

        convert_dsd_planar(&mut output, &input, 1, DsdLayout::ByteSwap);

        for g in 0..4 {
            for b in 0..4 {
                assert_eq!(output[g * 4 + b], input[g * 4 + (3 - b)]);
            }
        }
    }

    #[test]
    fn converter_formulas_hold_on_random_input() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x24B1);

        for _ in 0..50 {
            let nsamples = rng.gen_range(1..512);
            let src: Vec<u8> = (0..nsamples * 4).map(|_| rng.gen()).collect();
            let mut dst = vec![0u8; nsamples * 3];

            convert_24bit_packed(&mut dst, &src, nsamples);
            for i in 0..nsamples {
                for k in 0..3 {
                    assert_eq!(dst[3 * i + k], src[4 * i + k]);
                }
            }

            convert_24bit_packed_shifted(&mut dst, &src, nsamples);
            for i in 0..nsamples {
                for k in 0..3 {
                    assert_eq!(dst[3 * i + k], src[4 * i + k + 1]);
                }
            }
        }

        for _ in 0..50 {
            let groups = rng.gen_range(1..256);
            let bpc = groups * 4;
            let src: Vec<u8> = (0..bpc * 2).map(|_| rng.gen()).collect();
            let mut dst = vec![0u8; bpc * 2];

            convert_dsd_planar(&mut dst, &src, 2, DsdLayout::BitReverseSwap);
            for i in 0..groups {
                for b in 0..4 {
                    assert_eq!(dst[i * 8 + b], rev(src[i * 4 + (3 - b)]));
                    assert_eq!(dst[i * 8 + 4 + b], rev(src[bpc + i * 4 + (3 - b)]));
                }
            }
        }
    }
}
