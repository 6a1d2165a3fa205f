//! Reed-Solomon coding over GF(2^16).
//!
//! A [`Coder`] is configured with the number of data and recovery shards.
//! Recovery shard `r` is labeled with exponent `e_r` from the recovery
//! exponent sequence, and the generator matrix entry for input column `c`
//! is `alpha^(e_r * c)`. Any subset of recovery rows then yields an
//! invertible submatrix over any equally-sized subset of data columns,
//! which is what makes erasure reconstruction possible.
//!
//! Encode and reconstruct are row-parallel: each worker owns a disjoint
//! range of output shards and reads the input shards immutably, so the hot
//! path takes no locks. Both entry points poll a [`CancelToken`] between
//! per-shard kernel applications.

pub mod matrix;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;

use crate::errors::{ParError, Result};
use crate::gf16::slice::{mul_slice_xor_with_table, SplitMulTable};
use crate::gf16::{Gf16, ORDER};
use self::matrix::Matrix;

/// Most recovery shards a single set may carry.
pub const MAX_RECOVERY_SHARDS: usize = 32768;

/// Cooperative cancellation signal shared between a caller and the coder's
/// workers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Number of workers to use when the caller does not say.
pub fn default_num_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// The recovery exponent sequence: ascending integers whose gcd with 65535
/// is 1, skipping every multiple of 3, 5, 17 and 257. `alpha^e` then has
/// order 65535 for every labeled exponent, the property the generator
/// construction needs to keep erasure submatrices invertible. Exactly
/// 32768 such exponents exist below the group order.
pub fn recovery_exponents(count: usize) -> Result<Vec<u16>> {
    if count > MAX_RECOVERY_SHARDS {
        return Err(ParError::InvalidConfiguration(format!(
            "at most {} recovery shards are supported, got {}",
            MAX_RECOVERY_SHARDS, count
        )));
    }

    let mut exponents = Vec::with_capacity(count);
    let mut e: u32 = 1;
    while exponents.len() < count {
        if e > ORDER {
            return Err(ParError::InvalidConfiguration(format!(
                "recovery exponent sequence exhausted at {} shards",
                exponents.len()
            )));
        }
        if gcd(ORDER, e) == 1 {
            exponents.push(e as u16);
        }
        e += 1;
    }
    Ok(exponents)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let r = a % b;
        a = b;
        b = r;
    }
    a
}

/// A Reed-Solomon encoder/reconstructor for a fixed shard geometry.
pub struct Coder {
    num_data: usize,
    num_parity: usize,
    exponents: Vec<u16>,
    pool: rayon::ThreadPool,
}

impl Coder {
    /// A coder with the default worker count.
    pub fn new(num_data: usize, num_parity: usize) -> Result<Coder> {
        Coder::with_workers(num_data, num_parity, default_num_workers())
    }

    pub fn with_workers(num_data: usize, num_parity: usize, num_workers: usize) -> Result<Coder> {
        if num_data == 0 || num_parity == 0 {
            return Err(ParError::InvalidConfiguration(
                "need at least one data shard and one recovery shard".to_string(),
            ));
        }
        if num_data + num_parity > ORDER as usize {
            return Err(ParError::InvalidConfiguration(format!(
                "{} data + {} recovery shards exceed the field size",
                num_data, num_parity
            )));
        }

        let exponents = recovery_exponents(num_parity)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers.max(1))
            .build()
            .map_err(|e| ParError::InvalidConfiguration(format!("worker pool: {}", e)))?;

        Ok(Coder {
            num_data,
            num_parity,
            exponents,
            pool,
        })
    }

    pub fn num_data(&self) -> usize {
        self.num_data
    }

    pub fn num_parity(&self) -> usize {
        self.num_parity
    }

    /// The exponent labeling recovery shard `row`.
    pub fn exponent(&self, row: usize) -> u16 {
        self.exponents[row]
    }

    pub fn exponents(&self) -> &[u16] {
        &self.exponents
    }

    #[inline]
    fn generator_entry(&self, row: usize, col: usize) -> Gf16 {
        Gf16::alpha_pow(self.exponents[row] as u32 * col as u32)
    }

    fn check_shard_lengths<'a>(
        &self,
        shards: impl Iterator<Item = &'a [u8]>,
    ) -> Result<Option<usize>> {
        let mut expected = None;
        for shard in shards {
            match expected {
                None => {
                    if shard.len() % 2 != 0 {
                        return Err(ParError::ShardLengthMismatch {
                            expected: shard.len() + 1,
                            actual: shard.len(),
                        });
                    }
                    expected = Some(shard.len());
                }
                Some(len) if shard.len() != len => {
                    return Err(ParError::ShardLengthMismatch {
                        expected: len,
                        actual: shard.len(),
                    });
                }
                Some(_) => {}
            }
        }
        Ok(expected)
    }

    /// Compute all recovery shards for the given data shards.
    pub fn generate_parity(&self, data: &[Vec<u8>], cancel: &CancelToken) -> Result<Vec<Vec<u8>>> {
        if data.len() != self.num_data {
            return Err(ParError::InvalidConfiguration(format!(
                "expected {} data shards, got {}",
                self.num_data,
                data.len()
            )));
        }
        let shard_len = self
            .check_shard_lengths(data.iter().map(|s| s.as_slice()))?
            .unwrap_or(0);

        self.pool.install(|| {
            (0..self.num_parity)
                .into_par_iter()
                .map(|row| {
                    let mut out = vec![0u8; shard_len];
                    for (col, src) in data.iter().enumerate() {
                        if cancel.is_canceled() {
                            return Err(ParError::Canceled);
                        }
                        let table = SplitMulTable::new(self.generator_entry(row, col));
                        mul_slice_xor_with_table(&table, src, &mut out);
                    }
                    Ok(out)
                })
                .collect()
        })
    }

    /// Check that the given parity shards are exactly what
    /// [`Coder::generate_parity`] would produce for the data shards.
    pub fn verify_parity(
        &self,
        data: &[Vec<u8>],
        parity: &[Vec<u8>],
        cancel: &CancelToken,
    ) -> Result<bool> {
        if parity.len() != self.num_parity {
            return Ok(false);
        }
        let computed = self.generate_parity(data, cancel)?;
        Ok(computed == parity)
    }

    /// Reconstruct missing data shards in place.
    ///
    /// `data[i]` is `None` for an absent input shard; `parity[r]` is `None`
    /// for an absent recovery shard (indexed by recovery row, not by
    /// exponent value). On success every `data` entry is `Some`. Absent
    /// parity beyond what reconstruction needs is tolerated.
    pub fn reconstruct(
        &self,
        data: &mut [Option<Vec<u8>>],
        parity: &[Option<Vec<u8>>],
        cancel: &CancelToken,
    ) -> Result<()> {
        if data.len() != self.num_data || parity.len() > self.num_parity {
            return Err(ParError::InvalidConfiguration(format!(
                "reconstruct called with {} data and {} parity shards for a {}+{} coder",
                data.len(),
                parity.len(),
                self.num_data,
                self.num_parity
            )));
        }

        let shard_len = self.check_shard_lengths(
            data.iter()
                .filter_map(|s| s.as_deref())
                .chain(parity.iter().filter_map(|s| s.as_deref())),
        )?;

        let missing: Vec<usize> = (0..data.len()).filter(|&i| data[i].is_none()).collect();
        if missing.is_empty() {
            return Ok(());
        }
        let shard_len = shard_len.ok_or(ParError::InsufficientRecovery)?;

        let present: Vec<usize> = (0..data.len()).filter(|&i| data[i].is_some()).collect();
        let usable_rows: Vec<usize> = (0..parity.len())
            .filter(|&r| parity[r].is_some())
            .collect();
        if usable_rows.len() < missing.len() {
            return Err(ParError::InsufficientRecovery);
        }
        let rows = &usable_rows[..missing.len()];

        // Each chosen recovery row gives one equation over the missing
        // columns once the known data contributions move to the right-hand
        // side.
        let rhs: Vec<Vec<u8>> = self.pool.install(|| {
            rows.par_iter()
                .map(|&row| {
                    let mut acc = parity[row]
                        .as_ref()
                        .expect("row was selected as present")
                        .clone();
                    for &col in &present {
                        if cancel.is_canceled() {
                            return Err(ParError::Canceled);
                        }
                        let table = SplitMulTable::new(self.generator_entry(row, col));
                        let src = data[col].as_ref().expect("column is present");
                        mul_slice_xor_with_table(&table, src, &mut acc);
                    }
                    Ok(acc)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let square = Matrix::from_fn(missing.len(), missing.len(), |i, j| {
            self.generator_entry(rows[i], missing[j])
        });
        let inverse = square.invert()?;

        let reconstructed: Vec<Vec<u8>> = self.pool.install(|| {
            (0..missing.len())
                .into_par_iter()
                .map(|j| {
                    let mut out = vec![0u8; shard_len];
                    for (i, rhs_row) in rhs.iter().enumerate() {
                        if cancel.is_canceled() {
                            return Err(ParError::Canceled);
                        }
                        let table = SplitMulTable::new(inverse.at(j, i));
                        mul_slice_xor_with_table(&table, rhs_row, &mut out);
                    }
                    Ok(out)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        for (j, shard) in missing.into_iter().zip(reconstructed) {
            data[j] = Some(shard);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shards(rows: &[&[u8]]) -> Vec<Vec<u8>> {
        rows.iter().map(|r| r.to_vec()).collect()
    }

    #[test]
    fn exponent_sequence_skips_noncoprime_values() {
        let exps = recovery_exponents(8).unwrap();
        assert_eq!(exps, vec![1, 2, 4, 7, 8, 11, 13, 14]);
    }

    #[test]
    fn exponent_sequence_is_coprime_and_covers_full_capacity() {
        let exps = recovery_exponents(MAX_RECOVERY_SHARDS).unwrap();
        assert_eq!(exps.len(), MAX_RECOVERY_SHARDS);
        assert!(exps.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(exps.iter().all(|&e| gcd(ORDER, e as u32) == 1));
        assert_eq!(*exps.last().unwrap(), 65534);
    }

    #[test]
    fn too_many_recovery_shards_rejected() {
        assert!(recovery_exponents(MAX_RECOVERY_SHARDS + 1).is_err());
    }

    #[test]
    fn parity_round_trip() {
        let data = shards(&[
            &[0x01, 0x00, 0x02, 0x00],
            &[0x03, 0x00, 0x04, 0x00],
            &[0x05, 0x00, 0x06, 0x00],
            &[0x07, 0x00, 0x08, 0x00],
            &[0x09, 0x00, 0x0a, 0x00],
        ]);
        let coder = Coder::with_workers(5, 3, 2).unwrap();
        let parity = coder.generate_parity(&data, &CancelToken::new()).unwrap();
        assert_eq!(parity.len(), 3);
        for row in &parity {
            assert_eq!(row.len(), 4);
        }
        assert!(coder
            .verify_parity(&data, &parity, &CancelToken::new())
            .unwrap());
    }

    #[test]
    fn reconstruct_missing_data() {
        let data = shards(&[
            &[0x01, 0x02],
            &[0x03, 0x04],
            &[0x05, 0x06],
            &[0x07, 0x08],
            &[0x09, 0x0a],
        ]);
        let coder = Coder::with_workers(5, 3, 2).unwrap();
        let parity = coder.generate_parity(&data, &CancelToken::new()).unwrap();

        let mut corrupted: Vec<Option<Vec<u8>>> = vec![
            None,
            Some(data[1].clone()),
            None,
            Some(data[3].clone()),
            None,
        ];
        let parity: Vec<Option<Vec<u8>>> = parity.into_iter().map(Some).collect();
        coder
            .reconstruct(&mut corrupted, &parity, &CancelToken::new())
            .unwrap();

        let recovered: Vec<Vec<u8>> = corrupted.into_iter().map(Option::unwrap).collect();
        assert_eq!(recovered, data);
    }

    #[test]
    fn reconstruct_with_missing_parity() {
        // Mixed erasures: data shards 0 and 2 and recovery shard 0 gone.
        let data = shards(&[
            &[0x11, 0x22],
            &[0x33, 0x44],
            &[0x55, 0x66],
            &[0x77, 0x88],
            &[0x99, 0xaa],
        ]);
        let coder = Coder::with_workers(5, 3, 2).unwrap();
        let parity = coder.generate_parity(&data, &CancelToken::new()).unwrap();

        let mut corrupted: Vec<Option<Vec<u8>>> = vec![
            None,
            Some(data[1].clone()),
            None,
            Some(data[3].clone()),
            Some(data[4].clone()),
        ];
        let holey_parity = vec![None, Some(parity[1].clone()), Some(parity[2].clone())];
        coder
            .reconstruct(&mut corrupted, &holey_parity, &CancelToken::new())
            .unwrap();

        let recovered: Vec<Vec<u8>> = corrupted.into_iter().map(Option::unwrap).collect();
        assert_eq!(recovered, data);
    }

    #[test]
    fn reconstruct_not_enough_parity() {
        let data = shards(&[
            &[0x01, 0x02],
            &[0x03, 0x04],
            &[0x05, 0x06],
            &[0x07, 0x08],
            &[0x09, 0x0a],
        ]);
        let coder = Coder::with_workers(5, 3, 2).unwrap();
        let parity = coder.generate_parity(&data, &CancelToken::new()).unwrap();

        let mut corrupted: Vec<Option<Vec<u8>>> =
            vec![Some(data[0].clone()), None, None, None, None];
        let full_parity: Vec<Option<Vec<u8>>> = parity.iter().cloned().map(Some).collect();
        assert!(matches!(
            coder.reconstruct(&mut corrupted, &full_parity, &CancelToken::new()),
            Err(ParError::InsufficientRecovery)
        ));

        let mut corrupted: Vec<Option<Vec<u8>>> = vec![
            Some(data[0].clone()),
            Some(data[1].clone()),
            None,
            None,
            None,
        ];
        let holey_parity = vec![None, Some(parity[1].clone()), Some(parity[2].clone())];
        assert!(matches!(
            coder.reconstruct(&mut corrupted, &holey_parity, &CancelToken::new()),
            Err(ParError::InsufficientRecovery)
        ));
    }

    #[test]
    fn reconstruct_nothing_missing_is_noop() {
        let data = shards(&[&[0x01, 0x02], &[0x03, 0x04]]);
        let coder = Coder::with_workers(2, 1, 1).unwrap();
        let mut present: Vec<Option<Vec<u8>>> = data.iter().cloned().map(Some).collect();
        coder
            .reconstruct(&mut present, &[None], &CancelToken::new())
            .unwrap();
        let unchanged: Vec<Vec<u8>> = present.into_iter().map(Option::unwrap).collect();
        assert_eq!(unchanged, data);
    }

    #[test]
    fn canceled_token_stops_encode() {
        let data = shards(&[&[0u8; 64], &[1u8; 64]]);
        let coder = Coder::with_workers(2, 2, 1).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            coder.generate_parity(&data, &cancel),
            Err(ParError::Canceled)
        ));
    }

    #[test]
    fn mismatched_shard_lengths_rejected() {
        let data = vec![vec![0u8; 4], vec![0u8; 6]];
        let coder = Coder::with_workers(2, 1, 1).unwrap();
        assert!(matches!(
            coder.generate_parity(&data, &CancelToken::new()),
            Err(ParError::ShardLengthMismatch { .. })
        ));
    }
}
