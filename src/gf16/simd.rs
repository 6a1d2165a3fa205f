//! SSSE3 multiply-XOR kernel.
//!
//! Sixteen field elements are processed per iteration using the split-table
//! PSHUFB technique: each 16-bit product is the XOR of four nibble lookups,
//! and each lookup table fits in one 128-bit register.
//!
//! PSHUFB indexes bytes, so the shard is first deinterleaved from its
//! "standard" little-endian layout into an "alt" layout of two byte planes:
//! one register holding every element's low byte, one holding every high
//! byte. After the lookups the product planes are interleaved back before
//! the XOR into `dst`. The plane maps are exposed (and tested) as scalar
//! primitives [`standard_to_alt`] and [`alt_to_standard`].

use std::arch::x86_64::*;

use super::slice::SplitMulTable;

/// Deinterleave 16 little-endian elements into (low-byte, high-byte) planes.
pub fn standard_to_alt(in0: &[u8; 16], in1: &[u8; 16]) -> ([u8; 16], [u8; 16]) {
    let mut low = [0u8; 16];
    let mut high = [0u8; 16];
    for i in 0..8 {
        low[i] = in0[2 * i];
        high[i] = in0[2 * i + 1];
        low[i + 8] = in1[2 * i];
        high[i + 8] = in1[2 * i + 1];
    }
    (low, high)
}

/// Inverse of [`standard_to_alt`].
pub fn alt_to_standard(low: &[u8; 16], high: &[u8; 16]) -> ([u8; 16], [u8; 16]) {
    let mut out0 = [0u8; 16];
    let mut out1 = [0u8; 16];
    for i in 0..8 {
        out0[2 * i] = low[i];
        out0[2 * i + 1] = high[i];
        out1[2 * i] = low[i + 8];
        out1[2 * i + 1] = high[i + 8];
    }
    (out0, out1)
}

/// The eight PSHUFB tables for one coefficient: product low/high bytes for
/// each nibble position of the element's low and high bytes.
pub struct NibbleTables {
    low_lo_nib: [[u8; 16]; 2],
    low_hi_nib: [[u8; 16]; 2],
    high_lo_nib: [[u8; 16]; 2],
    high_hi_nib: [[u8; 16]; 2],
}

impl NibbleTables {
    /// Multiplication by a constant is GF(2)-linear in the operand, so each
    /// 256-entry half of the split table collapses into two 16-entry nibble
    /// tables whose lookups XOR together.
    pub fn new(table: &SplitMulTable) -> NibbleTables {
        let mut t = NibbleTables {
            low_lo_nib: [[0; 16]; 2],
            low_hi_nib: [[0; 16]; 2],
            high_lo_nib: [[0; 16]; 2],
            high_hi_nib: [[0; 16]; 2],
        };
        for nib in 0..16usize {
            let p = table.low[nib];
            t.low_lo_nib[0][nib] = p as u8;
            t.low_lo_nib[1][nib] = (p >> 8) as u8;

            let p = table.low[nib << 4];
            t.low_hi_nib[0][nib] = p as u8;
            t.low_hi_nib[1][nib] = (p >> 8) as u8;

            let p = table.high[nib];
            t.high_lo_nib[0][nib] = p as u8;
            t.high_lo_nib[1][nib] = (p >> 8) as u8;

            let p = table.high[nib << 4];
            t.high_hi_nib[0][nib] = p as u8;
            t.high_hi_nib[1][nib] = (p >> 8) as u8;
        }
        t
    }
}

#[inline]
unsafe fn load_table(table: &[u8; 16]) -> __m128i {
    _mm_loadu_si128(table.as_ptr() as *const __m128i)
}

/// `dst[..n] ^= c * src[..n]` for the largest `n` that is a multiple of 32;
/// returns `n`. The caller handles the tail with the portable loop.
///
/// # Safety
///
/// The CPU must support SSSE3. `src` and `dst` must be the same length and
/// must not alias.
#[target_feature(enable = "ssse3")]
pub unsafe fn mul_slice_xor_ssse3(tables: &NibbleTables, src: &[u8], dst: &mut [u8]) -> usize {
    debug_assert_eq!(src.len(), dst.len());

    let end = src.len() / 32 * 32;

    let t_ll_lo = load_table(&tables.low_lo_nib[0]);
    let t_ll_hi = load_table(&tables.low_lo_nib[1]);
    let t_lh_lo = load_table(&tables.low_hi_nib[0]);
    let t_lh_hi = load_table(&tables.low_hi_nib[1]);
    let t_hl_lo = load_table(&tables.high_lo_nib[0]);
    let t_hl_hi = load_table(&tables.high_lo_nib[1]);
    let t_hh_lo = load_table(&tables.high_hi_nib[0]);
    let t_hh_hi = load_table(&tables.high_hi_nib[1]);

    let byte_mask = _mm_set1_epi16(0x00FF);
    let nib_mask = _mm_set1_epi8(0x0F);

    let mut pos = 0;
    while pos < end {
        let a = _mm_loadu_si128(src.as_ptr().add(pos) as *const __m128i);
        let b = _mm_loadu_si128(src.as_ptr().add(pos + 16) as *const __m128i);

        // Standard-to-alt: gather low bytes in one register, high bytes in
        // the other.
        let low_plane = _mm_packus_epi16(_mm_and_si128(a, byte_mask), _mm_and_si128(b, byte_mask));
        let high_plane = _mm_packus_epi16(_mm_srli_epi16(a, 8), _mm_srli_epi16(b, 8));

        let low_lo = _mm_and_si128(low_plane, nib_mask);
        let low_hi = _mm_and_si128(_mm_srli_epi16(low_plane, 4), nib_mask);
        let high_lo = _mm_and_si128(high_plane, nib_mask);
        let high_hi = _mm_and_si128(_mm_srli_epi16(high_plane, 4), nib_mask);

        // Product planes: four lookups each, XOR-folded.
        let prod_lo = _mm_xor_si128(
            _mm_xor_si128(
                _mm_shuffle_epi8(t_ll_lo, low_lo),
                _mm_shuffle_epi8(t_lh_lo, low_hi),
            ),
            _mm_xor_si128(
                _mm_shuffle_epi8(t_hl_lo, high_lo),
                _mm_shuffle_epi8(t_hh_lo, high_hi),
            ),
        );
        let prod_hi = _mm_xor_si128(
            _mm_xor_si128(
                _mm_shuffle_epi8(t_ll_hi, low_lo),
                _mm_shuffle_epi8(t_lh_hi, low_hi),
            ),
            _mm_xor_si128(
                _mm_shuffle_epi8(t_hl_hi, high_lo),
                _mm_shuffle_epi8(t_hh_hi, high_hi),
            ),
        );

        // Alt-to-standard and accumulate.
        let out0 = _mm_unpacklo_epi8(prod_lo, prod_hi);
        let out1 = _mm_unpackhi_epi8(prod_lo, prod_hi);

        let d0 = _mm_loadu_si128(dst.as_ptr().add(pos) as *const __m128i);
        let d1 = _mm_loadu_si128(dst.as_ptr().add(pos + 16) as *const __m128i);
        _mm_storeu_si128(
            dst.as_mut_ptr().add(pos) as *mut __m128i,
            _mm_xor_si128(d0, out0),
        );
        _mm_storeu_si128(
            dst.as_mut_ptr().add(pos + 16) as *mut __m128i,
            _mm_xor_si128(d1, out1),
        );

        pos += 32;
    }

    end
}
