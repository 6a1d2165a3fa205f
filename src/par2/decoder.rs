//! PAR2 verification and repair.
//!
//! The decoder pools packets from the index file and every sibling `.par2`
//! file, resolves the recovery set, then checks each protected file. An
//! intact file (matching length and MD5) is accepted wholesale; anything
//! else gets the slice hunt: a CRC32-indexed window slides over the file
//! byte by byte and candidate hits are confirmed by MD5, so displaced
//! slices are found wherever they ended up. Repair feeds the surviving
//! slices and recovery shards through the coder and rewrites every file
//! that could not be taken as-is.

use std::path::{Path, PathBuf};

use log::debug;
use rustc_hash::FxHashMap;

use crate::checksum;
use crate::crc_window::CrcWindow;
use crate::domain::FileId;
use crate::errors::{ParError, Result};
use crate::fileio::FileIO;
use crate::packets::{parse_packets, PacketSet, SliceChecksum};
use crate::reporters::{ReportEvent, Reporter};
use crate::rs16::{recovery_exponents, CancelToken, Coder, MAX_RECOVERY_SHARDS};

/// Where one input slice's bytes were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SliceLocation {
    /// Byte offset into the file's current content; the window may run past
    /// the end, in which case the tail is zero padding.
    Found(usize),
    Missing,
}

struct FileCheck {
    file_id: FileId,
    path: PathBuf,
    file_length: u64,
    /// Current on-disk content, if the file exists.
    data: Option<Vec<u8>>,
    /// Whole file matched its description; slices were not hunted.
    intact: bool,
    slices: Vec<SliceLocation>,
}

pub struct Decoder<'a> {
    fileio: &'a dyn FileIO,
    reporter: &'a dyn Reporter,
    index_path: PathBuf,
    num_workers: usize,
    set: PacketSet,
    checks: Vec<FileCheck>,
}

impl<'a> Decoder<'a> {
    /// Load packets from the index file and its sibling `.par2` files and
    /// resolve the recovery set.
    pub fn new(
        fileio: &'a dyn FileIO,
        reporter: &'a dyn Reporter,
        index_path: &Path,
        num_workers: usize,
    ) -> Result<Decoder<'a>> {
        let mut pool = Vec::new();

        let index_bytes = fileio
            .read_file(index_path)
            .map_err(|e| ParError::io(index_path.to_path_buf(), e))?;
        pool.extend(parse_packets(&index_bytes, reporter));

        let dir = index_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let prefix = format!("{}.", set_stem(index_path));
        let siblings = fileio
            .find_with_prefix_and_suffix(&dir, &prefix, ".par2")
            .map_err(|e| ParError::io(dir.clone(), e))?;

        for (i, path) in siblings.iter().enumerate() {
            if path == index_path {
                continue;
            }
            match fileio.read_file(path) {
                Ok(bytes) => {
                    reporter.report(ReportEvent::VolumeFileLoaded {
                        index: i + 1,
                        path: path.clone(),
                        error: None,
                    });
                    pool.extend(parse_packets(&bytes, reporter));
                }
                Err(e) => {
                    reporter.report(ReportEvent::VolumeFileLoaded {
                        index: i + 1,
                        path: path.clone(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let set = PacketSet::resolve(pool, reporter)?;
        Ok(Decoder {
            fileio,
            reporter,
            index_path: index_path.to_path_buf(),
            num_workers,
            set,
            checks: Vec::new(),
        })
    }

    pub fn set(&self) -> &PacketSet {
        &self.set
    }

    fn slice_size(&self) -> usize {
        self.set.main.slice_size as usize
    }

    /// Check every protected file, hunting for slices in damaged ones.
    pub fn load_file_data(&mut self) -> Result<()> {
        let dir = self
            .index_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let total = self.set.main.file_ids.len();
        let file_ids = self.set.main.file_ids.clone();

        let mut checks = Vec::with_capacity(total);
        for (i, file_id) in file_ids.iter().enumerate() {
            let desc = self.set.description(file_id)?;
            let file_length = desc.file_length;
            let expected_hash = desc.file_hash;
            let path = dir.join(desc.file_name_string());
            let slice_count = self.set.slice_count(file_length);

            let data = match self.fileio.read_file(&path) {
                Ok(data) => Some(data),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.reporter.report(ReportEvent::DataFileLoaded {
                        index: i + 1,
                        total,
                        path: path.clone(),
                        byte_count: 0,
                        hits: 0,
                        misses: 0,
                        error: Some(e.to_string()),
                    });
                    None
                }
                Err(e) => return Err(ParError::io(path, e)),
            };

            let check = match data {
                None => FileCheck {
                    file_id: *file_id,
                    path,
                    file_length,
                    data: None,
                    intact: false,
                    slices: vec![SliceLocation::Missing; slice_count],
                },
                Some(data) => {
                    let intact = data.len() as u64 == file_length
                        && checksum::md5(&data) == expected_hash;
                    if intact {
                        let slice_size = self.slice_size();
                        self.reporter.report(ReportEvent::DataFileLoaded {
                            index: i + 1,
                            total,
                            path: path.clone(),
                            byte_count: data.len(),
                            hits: slice_count,
                            misses: 0,
                            error: None,
                        });
                        let slices = (0..slice_count)
                            .map(|s| SliceLocation::Found(s * slice_size))
                            .collect();
                        FileCheck {
                            file_id: *file_id,
                            path,
                            file_length,
                            data: Some(data),
                            intact: true,
                            slices,
                        }
                    } else {
                        self.check_damaged_file(i, total, *file_id, path, file_length, data)
                    }
                }
            };
            checks.push(check);
        }

        self.checks = checks;
        Ok(())
    }

    fn check_damaged_file(
        &self,
        index: usize,
        total: usize,
        file_id: FileId,
        path: PathBuf,
        file_length: u64,
        data: Vec<u8>,
    ) -> FileCheck {
        if data.len() as u64 != file_length {
            self.reporter.report(ReportEvent::DataFileWrongByteCount {
                file_id,
                path: path.clone(),
            });
        } else {
            self.reporter.report(ReportEvent::DataFileHashMismatch {
                file_id,
                path: path.clone(),
            });
        }

        let slice_count = self.set.slice_count(file_length);
        let (slices, hits, misses) = match self.set.slice_checksums.get(&file_id) {
            Some(sums) => self.hunt_slices(&data, &sums.slice_checksums),
            None => {
                debug!("no slice checksums for {}; cannot match slices", file_id);
                (vec![SliceLocation::Missing; slice_count], 0, 0)
            }
        };

        self.reporter.report(ReportEvent::DataFileLoaded {
            index: index + 1,
            total,
            path: path.clone(),
            byte_count: data.len(),
            hits,
            misses,
            error: None,
        });

        self.report_corrupt_chunks(file_id, &path, file_length, &slices);

        FileCheck {
            file_id,
            path,
            file_length,
            data: Some(data),
            intact: false,
            slices,
        }
    }

    /// Slide a slice-sized window over the file one byte at a time. A CRC32
    /// index over the file's expected slice checksums screens candidates;
    /// MD5 confirms them. Returns slice locations plus hit/miss counts.
    fn hunt_slices(
        &self,
        data: &[u8],
        checksums: &[SliceChecksum],
    ) -> (Vec<SliceLocation>, usize, usize) {
        let slice_size = self.slice_size();
        let mut locations = vec![SliceLocation::Missing; checksums.len()];
        let mut hits = 0usize;
        let mut misses = 0usize;

        let mut by_crc: FxHashMap<u32, Vec<usize>> = FxHashMap::default();
        for (i, sum) in checksums.iter().enumerate() {
            by_crc.entry(sum.crc32).or_default().push(i);
        }

        let confirm = |start: usize, crc: u32, window: &[u8], locations: &mut Vec<SliceLocation>| {
            let Some(candidates) = by_crc.get(&crc) else {
                return (0, 0);
            };
            let mut h = 0;
            let mut m = 0;
            let mut window_md5 = None;
            for &slice_idx in candidates {
                if locations[slice_idx] != SliceLocation::Missing {
                    continue;
                }
                let md5 = *window_md5.get_or_insert_with(|| checksum::md5(window));
                if md5 == checksums[slice_idx].md5 {
                    locations[slice_idx] = SliceLocation::Found(start);
                    h += 1;
                    break;
                } else {
                    m += 1;
                }
            }
            (h, m)
        };

        // Full windows roll a sliding CRC across the file.
        if data.len() >= slice_size && slice_size > 0 {
            let window = CrcWindow::new(slice_size);
            let mut crc = crc32fast::hash(&data[..slice_size]);
            let mut start = 0usize;
            loop {
                let (h, m) = confirm(start, crc, &data[start..start + slice_size], &mut locations);
                hits += h;
                misses += m;

                if start + slice_size >= data.len() {
                    break;
                }
                crc = window.slide(crc, data[start + slice_size], data[start]);
                start += 1;
            }
        }

        // Windows running past the end of the file see zero padding; only
        // the final slice of the file can live here, so the quadratic cost
        // is bounded by one slice length.
        let tail_start = if data.len() >= slice_size {
            data.len() - slice_size + 1
        } else {
            0
        };
        let mut padded = vec![0u8; slice_size];
        for start in tail_start..data.len() {
            let available = data.len() - start;
            padded[..available].copy_from_slice(&data[start..]);
            padded[available..].fill(0);
            let crc = crc32fast::hash(&padded);
            let (h, m) = confirm(start, crc, &padded, &mut locations);
            hits += h;
            misses += m;
        }

        (locations, hits, misses)
    }

    /// Report contiguous runs of unmatched slices as damaged byte ranges.
    fn report_corrupt_chunks(
        &self,
        file_id: FileId,
        path: &Path,
        file_length: u64,
        slices: &[SliceLocation],
    ) {
        let slice_size = self.set.main.slice_size;
        let mut run_start: Option<usize> = None;
        for i in 0..=slices.len() {
            let missing = i < slices.len() && slices[i] == SliceLocation::Missing;
            match (missing, run_start) {
                (true, None) => run_start = Some(i),
                (false, Some(first)) => {
                    self.reporter.report(ReportEvent::CorruptDataChunk {
                        file_id,
                        path: path.to_path_buf(),
                        start_offset: first as u64 * slice_size,
                        end_offset: (i as u64 * slice_size).min(file_length),
                    });
                    run_start = None;
                }
                _ => {}
            }
        }
    }

    fn missing_slice_count(&self) -> usize {
        self.checks
            .iter()
            .flat_map(|c| &c.slices)
            .filter(|&&s| s == SliceLocation::Missing)
            .count()
    }

    /// Whether any input slice is absent or unmatched.
    pub fn needs_repair(&self) -> bool {
        self.checks
            .iter()
            .any(|c| !c.intact || c.slices.iter().any(|&s| s == SliceLocation::Missing))
    }

    /// Verify the set. `Ok(true)` means repair is needed (and possible);
    /// `InsufficientRecovery` means repair is needed but cannot succeed.
    pub fn verify(&self) -> Result<bool> {
        let missing = self.missing_slice_count();
        if missing > self.set.recovery_slices.len() {
            return Err(ParError::InsufficientRecovery);
        }
        Ok(self.needs_repair())
    }

    /// Extract one slice's current bytes, zero-padded to the slice size.
    fn slice_bytes(&self, check: &FileCheck, location: SliceLocation) -> Option<Vec<u8>> {
        let slice_size = self.slice_size();
        match location {
            SliceLocation::Missing => None,
            SliceLocation::Found(offset) => {
                let data = check.data.as_ref()?;
                let mut shard = vec![0u8; slice_size];
                let end = (offset + slice_size).min(data.len());
                if offset < end {
                    shard[..end - offset].copy_from_slice(&data[offset..end]);
                }
                Some(shard)
            }
        }
    }

    /// Map the present recovery packets onto coder rows by their exponents.
    fn recovery_rows(&self) -> Result<Vec<Option<Vec<u8>>>> {
        let slice_size = self.slice_size();
        let mut highest_row = 0usize;
        let exponents = recovery_exponents(MAX_RECOVERY_SHARDS)?;
        let row_of: FxHashMap<u32, usize> = exponents
            .iter()
            .enumerate()
            .map(|(row, &e)| (e as u32, row))
            .collect();

        let mut placed: Vec<(usize, Vec<u8>)> = Vec::new();
        for (exponent, packet) in &self.set.recovery_slices {
            let Some(&row) = row_of.get(exponent) else {
                debug!("recovery packet with out-of-sequence exponent {}", exponent);
                continue;
            };
            if packet.recovery_data.len() != slice_size {
                debug!(
                    "recovery packet with exponent {} has {} bytes, expected {}",
                    exponent,
                    packet.recovery_data.len(),
                    slice_size
                );
                continue;
            }
            highest_row = highest_row.max(row);
            placed.push((row, packet.recovery_data.clone()));
        }

        if placed.is_empty() {
            return Err(ParError::InsufficientRecovery);
        }

        let mut rows: Vec<Option<Vec<u8>>> = vec![None; highest_row + 1];
        for (row, data) in placed {
            rows[row] = Some(data);
        }
        Ok(rows)
    }

    /// Reconstruct whatever is damaged and rewrite the affected files.
    /// Returns the repaired paths; an already-sound set repairs to nothing.
    pub fn repair(&mut self, check_parity: bool, cancel: &CancelToken) -> Result<Vec<PathBuf>> {
        let total_slices = self.set.total_slice_count()?;
        let mut shards: Vec<Option<Vec<u8>>> = Vec::with_capacity(total_slices);
        for check in &self.checks {
            for &location in &check.slices {
                shards.push(self.slice_bytes(check, location));
            }
        }

        let any_missing = shards.iter().any(Option::is_none);
        if !self.needs_repair() {
            if check_parity {
                let rows = self.recovery_rows()?;
                self.check_parity_consistency(&shards, &rows, cancel)?;
            }
            return Ok(Vec::new());
        }

        if any_missing {
            let rows = self.recovery_rows()?;
            let coder = Coder::with_workers(shards.len(), rows.len(), self.num_workers)?;
            coder.reconstruct(&mut shards, &rows, cancel)?;
        }

        // Reassemble and rewrite every file that could not be used as-is.
        let slice_size = self.slice_size();
        let repaired_total = self.checks.iter().filter(|c| !c.intact).count();
        let mut repaired = Vec::with_capacity(repaired_total);
        let mut shard_cursor = 0usize;

        for i in 0..self.checks.len() {
            let (intact, slice_count) = {
                let check = &self.checks[i];
                (check.intact, check.slices.len())
            };
            let file_shards = &shards[shard_cursor..shard_cursor + slice_count];
            shard_cursor += slice_count;
            if intact {
                continue;
            }

            let (file_id, path, file_length) = {
                let check = &self.checks[i];
                (check.file_id, check.path.clone(), check.file_length)
            };
            let expected_hash = self.set.description(&file_id)?.file_hash;

            let mut restored = Vec::with_capacity(file_length as usize);
            for shard in file_shards {
                let shard = shard.as_ref().expect("reconstruction filled every slice");
                restored.extend_from_slice(shard);
            }
            restored.truncate(file_length as usize);
            debug_assert!(restored.len() as u64 == file_length || slice_size == 0);

            let actual = checksum::md5(&restored);
            if actual != expected_hash {
                return Err(ParError::RepairFailed {
                    file_id,
                    expected: expected_hash,
                    actual,
                });
            }

            let write_result = self.fileio.write_file(&path, &restored);
            self.reporter.report(ReportEvent::DataFileWritten {
                index: repaired.len() + 1,
                total: repaired_total,
                path: path.clone(),
                byte_count: restored.len(),
                error: write_result.as_ref().err().map(|e| e.to_string()),
            });
            write_result.map_err(|e| ParError::io(path.clone(), e))?;

            // Read back and confirm what actually landed on disk.
            let on_disk = self
                .fileio
                .read_file(&path)
                .map_err(|e| ParError::io(path.clone(), e))?;
            let on_disk_hash = checksum::md5(&on_disk);
            if on_disk_hash != expected_hash {
                return Err(ParError::RepairFailed {
                    file_id,
                    expected: expected_hash,
                    actual: on_disk_hash,
                });
            }

            self.checks[i].data = Some(restored);
            self.checks[i].intact = true;
            self.checks[i].slices = (0..slice_count)
                .map(|s| SliceLocation::Found(s * slice_size))
                .collect();
            repaired.push(path);
        }

        Ok(repaired)
    }

    /// With everything present, recomputed parity must match the recovery
    /// packets that exist.
    fn check_parity_consistency(
        &self,
        shards: &[Option<Vec<u8>>],
        rows: &[Option<Vec<u8>>],
        cancel: &CancelToken,
    ) -> Result<()> {
        let data: Vec<Vec<u8>> = shards
            .iter()
            .map(|s| s.clone().expect("caller checked all slices are present"))
            .collect();
        let coder = Coder::with_workers(data.len(), rows.len(), self.num_workers)?;
        let computed = coder.generate_parity(&data, cancel)?;
        for (row, present) in rows.iter().enumerate() {
            if let Some(present) = present {
                if computed[row] != *present {
                    return Err(ParError::InvalidFormat {
                        location: self.index_path.display().to_string(),
                        detail: format!("recovery slice in row {} is inconsistent", row),
                    });
                }
            }
        }
        Ok(())
    }
}

/// The stem that names the whole set: the index file name without `.par2`
/// and without any `.volNN+NN` volume infix.
fn set_stem(index_path: &Path) -> String {
    let name = index_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = name.strip_suffix(".par2").unwrap_or(&name);
    match name.rfind(".vol") {
        Some(pos)
            if name[pos + 4..]
                .chars()
                .all(|c| c.is_ascii_digit() || c == '+')
                && name[pos + 4..].contains('+') =>
        {
            name[..pos].to_string()
        }
        _ => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_stem_variants() {
        assert_eq!(set_stem(Path::new("d/x.par2")), "x");
        assert_eq!(set_stem(Path::new("d/x.vol00+01.par2")), "x");
        assert_eq!(set_stem(Path::new("d/x.volatile.par2")), "x.volatile");
        assert_eq!(set_stem(Path::new("d/archive.tar.par2")), "archive.tar");
    }
}
