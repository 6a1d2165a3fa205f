//! Bulk multiply-XOR kernel over shards.
//!
//! The hot path of both encode and reconstruct is `dst ^= c * src` over
//! buffers holding little-endian 16-bit field elements. A per-coefficient
//! split table turns each element multiply into two lookups and a XOR;
//! on x86-64 with SSSE3 the same tables are further split into nibbles and
//! applied 16 elements at a time (see [`super::simd`]).
//!
//! The SIMD and portable paths produce bit-identical output; the dispatcher
//! hands any tail bytes that do not fill a SIMD lane to the portable loop.

use super::Gf16;

/// Per-coefficient lookup tables: `low[b] = c * b` and
/// `high[b] = c * (b << 8)` for every byte value `b`, so
/// `c * v == low[v & 0xff] ^ high[v >> 8]`.
pub struct SplitMulTable {
    pub low: [u16; 256],
    pub high: [u16; 256],
}

impl SplitMulTable {
    pub fn new(c: Gf16) -> SplitMulTable {
        let mut table = SplitMulTable {
            low: [0; 256],
            high: [0; 256],
        };
        for b in 0..256u16 {
            table.low[b as usize] = (c * Gf16::new(b)).value();
            table.high[b as usize] = (c * Gf16::new(b << 8)).value();
        }
        table
    }

    #[inline]
    pub fn mul(&self, v: u16) -> u16 {
        self.low[(v & 0xff) as usize] ^ self.high[(v >> 8) as usize]
    }
}

/// `dst[i] ^= c * src[i]` over little-endian 16-bit elements.
///
/// Both buffers must have the same, even, byte length.
pub fn mul_slice_xor(c: Gf16, src: &[u8], dst: &mut [u8]) {
    if c == Gf16::ZERO {
        return;
    }
    let table = SplitMulTable::new(c);
    mul_slice_xor_with_table(&table, src, dst);
}

/// [`mul_slice_xor`] with a caller-built table, for loops that reuse one
/// coefficient across many shards.
pub fn mul_slice_xor_with_table(table: &SplitMulTable, src: &[u8], dst: &mut [u8]) {
    assert_eq!(src.len(), dst.len(), "shard length mismatch");
    assert_eq!(src.len() % 2, 0, "shard length must be even");

    let done = {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("ssse3") {
                let nibbles = super::simd::NibbleTables::new(table);
                // Safety: SSSE3 support was just detected.
                unsafe { super::simd::mul_slice_xor_ssse3(&nibbles, src, dst) }
            } else {
                0
            }
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            0
        }
    };

    mul_slice_xor_portable(table, &src[done..], &mut dst[done..]);
}

/// The table-driven scalar loop; also the authority the SIMD kernel is
/// tested against.
pub fn mul_slice_xor_portable(table: &SplitMulTable, src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(2).zip(dst.chunks_exact_mut(2)) {
        let v = u16::from_le_bytes([s[0], s[1]]);
        let p = table.mul(v).to_le_bytes();
        d[0] ^= p[0];
        d[1] ^= p[1];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_table_matches_field_multiply() {
        for c in [0u16, 1, 2, 7, 0x1234, 0xFFFF] {
            let c = Gf16::new(c);
            let table = SplitMulTable::new(c);
            for v in [0u16, 1, 0x00ff, 0xff00, 0xabcd, 0xFFFF] {
                assert_eq!(table.mul(v), (c * Gf16::new(v)).value());
            }
        }
    }

    #[test]
    fn zero_coefficient_is_identity() {
        let src = vec![0xAB; 64];
        let mut dst: Vec<u8> = (0..64u8).collect();
        let before = dst.clone();
        mul_slice_xor(Gf16::ZERO, &src, &mut dst);
        assert_eq!(dst, before);
    }

    #[test]
    fn one_coefficient_is_xor() {
        let src: Vec<u8> = (0..64u8).collect();
        let mut dst = vec![0xF0u8; 64];
        mul_slice_xor(Gf16::ONE, &src, &mut dst);
        let expected: Vec<u8> = (0..64u8).map(|b| b ^ 0xF0).collect();
        assert_eq!(dst, expected);
    }

    #[test]
    fn kernel_accumulates() {
        // Applying the same multiply-XOR twice cancels out.
        let src: Vec<u8> = (0..128u8).collect();
        let mut dst = vec![0x5Au8; 128];
        let before = dst.clone();
        mul_slice_xor(Gf16::new(0x789a), &src, &mut dst);
        assert_ne!(dst, before);
        mul_slice_xor(Gf16::new(0x789a), &src, &mut dst);
        assert_eq!(dst, before);
    }

    #[test]
    fn dispatch_matches_portable_on_all_lengths() {
        // Covers SIMD-eligible lengths, tails, and sub-lane buffers.
        for len in [0usize, 2, 8, 30, 32, 34, 64, 100, 258] {
            let src: Vec<u8> = (0..len).map(|i| (i * 31 + 7) as u8).collect();
            let c = Gf16::new(0x4321);
            let table = SplitMulTable::new(c);

            let mut via_dispatch = vec![0x11u8; len];
            mul_slice_xor_with_table(&table, &src, &mut via_dispatch);

            let mut via_portable = vec![0x11u8; len];
            mul_slice_xor_portable(&table, &src, &mut via_portable);

            assert_eq!(via_dispatch, via_portable, "len={}", len);
        }
    }
}
