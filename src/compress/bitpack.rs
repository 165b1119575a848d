pub const BLOCK_LEN: usize = 128;

/// Worst-case packed size for `n` 16-bit values: one width byte per block
/// plus full-width payload.
pub fn pack16_bound(n: usize) -> usize {
    n.div_ceil(BLOCK_LEN) + (n + 32) * 2
}

#[inline]
pub fn zigzag_encode(value: i16) -> u16 {
    ((value << 1) ^ (value >> 15)) as u16
}

#[inline]
pub fn zigzag_decode(value: u16) -> i16 {
    ((value >> 1) as i16) ^ -((value & 1) as i16)
}

/// Packs `src` into `dst` and returns the number of bytes written. `dst`
/// must hold at least `pack16_bound(src.len())` bytes.
///
/// Each block of up to [`BLOCK_LEN`] values is stored as one bit-width byte
/// followed by the zig-zag mapped values, little-endian bit-packed at that
/// width and byte-aligned per block.
pub fn pack16(src: &[i16], dst: &mut [u8]) -> usize {
    let mut out = 0;
    for block in src.chunks(BLOCK_LEN) {
        let mut seen = 0_u16;
        for &value in block {
            seen |= zigzag_encode(value);
        }
        let width = (16 - seen.leading_zeros()) as usize;
        dst[out] = width as u8;
        out += 1;
        if width == 0 {
            continue;
        }

        let mut scratch = 0_u64;
        let mut n_bits = 0;
        for &value in block {
            scratch |= (zigzag_encode(value) as u64) << n_bits;
            n_bits += width;
            while n_bits >= 8 {
                dst[out] = scratch as u8;
                out += 1;
                scratch >>= 8;
                n_bits -= 8;
            }
        }
        if n_bits > 0 {
            dst[out] = scratch as u8;
            out += 1;
        }
    }

    out
}

/// Recovers `dst.len()` values from `src` and returns the number of bytes
/// consumed.
pub fn unpack16(src: &[u8], dst: &mut [i16]) -> usize {
    let mut pos = 0;
    for block in dst.chunks_mut(BLOCK_LEN) {
        let width = src[pos] as usize;
        pos += 1;
        if width == 0 {
            for slot in block {
                *slot = 0;
            }
            continue;
        }

        let mask = (1_u64 << width) - 1;
        let mut scratch = 0_u64;
        let mut n_bits = 0;
        for slot in block {
            while n_bits < width {
                scratch |= (src[pos] as u64) << n_bits;
                pos += 1;
                n_bits += 8;
            }
            *slot = zigzag_decode((scratch & mask) as u16);
            scratch >>= width;
            n_bits -= width;
        }
    }

    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::{rngs::StdRng, SeedableRng};
    use rand_distr::{Distribution, Uniform};

    fn round_trip_values(values: &[i16]) {
        let mut packed = vec![0_u8; pack16_bound(values.len())];
        let packed_length = pack16(values, &mut packed);
        assert!(
            packed_length <= pack16_bound(values.len()),
            "packed length {} exceeds bound {}",
            packed_length,
            pack16_bound(values.len())
        );

        let mut decoded = vec![0_i16; values.len()];
        let consumed = unpack16(&packed[..packed_length], &mut decoded);
        assert_eq!(consumed, packed_length, "decoder consumed length mismatch");

        for (i, d) in decoded.iter().enumerate() {
            assert_eq!(
                *d, values[i],
                "failure to decode at index {}, input={}, output={}",
                i, values[i], d
            );
        }
    }

    mod zigzag {
        use super::*;

        #[test]
        fn small_magnitudes_encode_small() {
            assert_eq!(zigzag_encode(0), 0);
            assert_eq!(zigzag_encode(-1), 1);
            assert_eq!(zigzag_encode(1), 2);
            assert_eq!(zigzag_encode(-2), 3);
            assert_eq!(zigzag_encode(2), 4);
            assert_eq!(zigzag_encode(i16::MIN), u16::MAX);
        }

        #[test]
        fn round_trip() {
            for value in [0, 1, -1, 127, -128, i16::MAX, i16::MIN] {
                assert_eq!(zigzag_decode(zigzag_encode(value)), value);
            }
        }
    }

    mod pack16 {
        use super::*;

        #[test]
        fn round_trip() {
            let n_test = 5_u64;
            for seed in 0..n_test {
                let mut rng = StdRng::seed_from_u64(seed);
                let between = Uniform::from(i16::MIN..=i16::MAX);
                let values: Vec<i16> =
                    (0..10_000).map(|_| between.sample(&mut rng)).collect();
                round_trip_values(&values);
            }
        }

        #[test]
        fn round_trip_small_magnitudes() {
            let mut rng = StdRng::seed_from_u64(99);
            let between = Uniform::from(-2_i16..=2);
            let values: Vec<i16> = (0..10_000).map(|_| between.sample(&mut rng)).collect();

            let mut packed = vec![0_u8; pack16_bound(values.len())];
            let packed_length = pack16(&values, &mut packed);
            assert!(
                packed_length * 2 < values.len(),
                "small deltas should pack below half a byte per value, got {} bytes",
                packed_length
            );

            round_trip_values(&values);
        }

        #[test]
        fn round_trip_partial_blocks() {
            for n in [1, 2, 5, BLOCK_LEN - 1, BLOCK_LEN, BLOCK_LEN + 1, 1000] {
                let values: Vec<i16> = (0..n).map(|i| (i as i16).wrapping_mul(37)).collect();
                round_trip_values(&values);
            }
        }

        #[test]
        fn zeros_collapse_to_width_bytes() {
            let values = [0_i16; 1000];
            let mut packed = vec![0_u8; pack16_bound(values.len())];
            let packed_length = pack16(&values, &mut packed);
            assert_eq!(
                packed_length,
                values.len().div_ceil(BLOCK_LEN),
                "all-zero input should cost exactly one byte per block"
            );

            round_trip_values(&values);
        }

        #[test]
        fn extremes() {
            round_trip_values(&[i16::MIN, i16::MAX, 0, -1, 1]);
        }
    }
}
