//! Property tests for the GF(2^16) field and its bulk kernel.

use proptest::prelude::*;

use parrs::gf16::slice::{mul_slice_xor_portable, mul_slice_xor_with_table, SplitMulTable};
use parrs::gf16::Gf16;

proptest! {
    #[test]
    fn addition_is_associative_and_commutative(a: u16, b: u16, c: u16) {
        let (a, b, c) = (Gf16::new(a), Gf16::new(b), Gf16::new(c));
        prop_assert_eq!(a + b, b + a);
        prop_assert_eq!(a + (b + c), (a + b) + c);
    }

    #[test]
    fn multiplication_is_associative_and_commutative(a: u16, b: u16, c: u16) {
        let (a, b, c) = (Gf16::new(a), Gf16::new(b), Gf16::new(c));
        prop_assert_eq!(a * b, b * a);
        prop_assert_eq!(a * (b * c), (a * b) * c);
    }

    #[test]
    fn multiplication_distributes_over_addition(a: u16, b: u16, c: u16) {
        let (a, b, c) = (Gf16::new(a), Gf16::new(b), Gf16::new(c));
        prop_assert_eq!(a * (b + c), a * b + a * c);
    }

    #[test]
    fn nonzero_elements_have_inverses(a in 1u16..=u16::MAX) {
        let a = Gf16::new(a);
        let inv = a.checked_inv().expect("nonzero elements are invertible");
        prop_assert_eq!(a * inv, Gf16::ONE);
    }

    #[test]
    fn kernel_matches_elementwise_multiply(
        c: u16,
        elements in prop::collection::vec(any::<u16>(), 0..200),
        seed: u16,
    ) {
        let c = Gf16::new(c);
        let src: Vec<u8> = elements.iter().flat_map(|e| e.to_le_bytes()).collect();
        let mut dst: Vec<u8> = (0..src.len()).map(|i| (i as u16 ^ seed) as u8).collect();
        let expected: Vec<u8> = elements
            .iter()
            .zip(dst.chunks_exact(2))
            .flat_map(|(&e, d)| {
                let d = u16::from_le_bytes([d[0], d[1]]);
                (d ^ (c * Gf16::new(e)).value()).to_le_bytes()
            })
            .collect();

        let table = SplitMulTable::new(c);
        mul_slice_xor_with_table(&table, &src, &mut dst);
        prop_assert_eq!(dst, expected);
    }

    #[test]
    fn dispatched_kernel_agrees_with_portable(
        c: u16,
        bytes in prop::collection::vec(any::<u8>(), 0..300),
    ) {
        // Force an even byte length.
        let src = &bytes[..bytes.len() / 2 * 2];
        let table = SplitMulTable::new(Gf16::new(c));

        let mut dispatched = vec![0x3Cu8; src.len()];
        mul_slice_xor_with_table(&table, src, &mut dispatched);

        let mut portable = vec![0x3Cu8; src.len()];
        mul_slice_xor_portable(&table, src, &mut portable);

        prop_assert_eq!(dispatched, portable);
    }
}

#[cfg(target_arch = "x86_64")]
mod deinterleave {
    use parrs::gf16::simd::{alt_to_standard, standard_to_alt};
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn alt_map_round_trips(in0: [u8; 16], in1: [u8; 16]) {
            let (low, high) = standard_to_alt(&in0, &in1);
            prop_assert_eq!(alt_to_standard(&low, &high), (in0, in1));
        }

        #[test]
        fn alt_map_separates_planes(in0: [u8; 16], in1: [u8; 16]) {
            let (low, high) = standard_to_alt(&in0, &in1);
            for i in 0..8 {
                prop_assert_eq!(low[i], in0[2 * i]);
                prop_assert_eq!(high[i], in0[2 * i + 1]);
                prop_assert_eq!(low[i + 8], in1[2 * i]);
                prop_assert_eq!(high[i + 8], in1[2 * i + 1]);
            }
        }
    }
}
