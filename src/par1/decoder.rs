//! PAR1 verification and repair.
//!
//! The decoder starts from an index volume, resolves the protected files
//! next to it by the basenames in the file table, then hunts for parity
//! volumes `.p01 ..= .pNN`. Verification recomputes parity and compares;
//! repair reconstructs the missing or corrupt shards and rewrites the
//! affected files, checking each rewritten file's MD5 against its entry.

use std::path::{Path, PathBuf};

use log::debug;

use crate::checksum;
use crate::domain::Md5Hash;
use crate::errors::{ParError, Result};
use crate::fileio::FileIO;
use crate::reporters::{ReportEvent, Reporter};
use crate::rs16::{CancelToken, Coder};

use super::volume::{read_volume, Volume};

/// Assessment of an on-disk file against its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Present,
    Corrupt,
}

pub struct Decoder<'a> {
    fileio: &'a dyn FileIO,
    reporter: &'a dyn Reporter,
    index_path: PathBuf,
    index_volume: Volume,
    num_workers: usize,

    file_data: Vec<Option<Vec<u8>>>,
    shard_byte_count: usize,
    parity_data: Vec<Option<Vec<u8>>>,
}

impl std::fmt::Debug for Decoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("index_path", &self.index_path)
            .field("index_volume", &self.index_volume)
            .field("num_workers", &self.num_workers)
            .field("shard_byte_count", &self.shard_byte_count)
            .finish_non_exhaustive()
    }
}

impl<'a> Decoder<'a> {
    /// Read and validate the index volume.
    pub fn new(
        fileio: &'a dyn FileIO,
        reporter: &'a dyn Reporter,
        index_path: &Path,
        num_workers: usize,
    ) -> Result<Decoder<'a>> {
        let bytes = fileio
            .read_file(index_path)
            .map_err(|e| ParError::io(index_path.to_path_buf(), e))?;
        let index_volume = read_volume(&bytes)?;

        if index_volume.header.volume_number != 0 {
            return Err(ParError::InvalidFormat {
                location: index_path.display().to_string(),
                detail: format!(
                    "expected volume number 0 for index volume, got {}",
                    index_volume.header.volume_number
                ),
            });
        }

        Ok(Decoder {
            fileio,
            reporter,
            index_path: index_path.to_path_buf(),
            index_volume,
            num_workers,
            file_data: Vec::new(),
            shard_byte_count: 0,
            parity_data: Vec::new(),
        })
    }

    fn dir(&self) -> PathBuf {
        self.index_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    /// Load the protected files. Absent files become absent shards; files
    /// whose content contradicts their entry are marked corrupt and treated
    /// as absent for reconstruction.
    pub fn load_file_data(&mut self) -> Result<()> {
        let dir = self.dir();
        let total = self.index_volume.entries.len();
        let mut file_data = Vec::with_capacity(total);

        for (i, entry) in self.index_volume.entries.iter().enumerate() {
            let path = dir.join(&entry.filename);
            match self.fileio.read_file(&path) {
                Ok(data) => {
                    let state = self.classify(entry, &path, &data);
                    self.reporter.report(ReportEvent::DataFileLoaded {
                        index: i + 1,
                        total,
                        path,
                        byte_count: data.len(),
                        hits: 0,
                        misses: 0,
                        error: None,
                    });
                    file_data.push(if state == FileState::Present {
                        Some(data)
                    } else {
                        None
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    self.reporter.report(ReportEvent::DataFileLoaded {
                        index: i + 1,
                        total,
                        path,
                        byte_count: 0,
                        hits: 0,
                        misses: 0,
                        error: Some(e.to_string()),
                    });
                    file_data.push(None);
                }
                Err(e) => return Err(ParError::io(path, e)),
            }
        }

        self.file_data = file_data;
        Ok(())
    }

    fn classify(
        &self,
        entry: &super::file_entry::FileEntry,
        path: &Path,
        data: &[u8],
    ) -> FileState {
        if data.len() as u64 != entry.file_bytes {
            self.reporter.report(ReportEvent::DataFileWrongByteCount {
                file_id: crate::domain::FileId::new(*entry.hash.as_bytes()),
                path: path.to_path_buf(),
            });
            return FileState::Corrupt;
        }
        // Entries written by older tools leave the hash zeroed; nothing to
        // check against then.
        if entry.hash != Md5Hash::zero() && checksum::md5(data) != entry.hash {
            self.reporter.report(ReportEvent::DataFileHashMismatch {
                file_id: crate::domain::FileId::new(*entry.hash.as_bytes()),
                path: path.to_path_buf(),
            });
            return FileState::Corrupt;
        }
        FileState::Present
    }

    /// Search for parity volumes and load their payloads. Every name the
    /// encoder can emit (`.p01 ..= .p99`) is probed; absent volumes stay
    /// absent shards.
    pub fn load_parity_data(&mut self) -> Result<()> {
        let base = self.index_path.with_extension("");

        let mut shard_byte_count = 0usize;
        let mut parity_data: Vec<Option<Vec<u8>>> = vec![None; super::MAX_PARITY_VOLUMES];
        let mut highest = 0usize;

        for i in 1..=super::MAX_PARITY_VOLUMES {
            let path = base.with_extension(format!("p{:02}", i));
            let bytes = match self.fileio.read_file(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ParError::io(path, e)),
            };

            let volume = read_volume(&bytes)?;
            self.reporter.report(ReportEvent::VolumeFileLoaded {
                index: i,
                path: path.clone(),
                error: None,
            });

            if volume.header.volume_number != i as u64 {
                return Err(ParError::InvalidFormat {
                    location: path.display().to_string(),
                    detail: format!(
                        "expected volume number {}, got {}",
                        i, volume.header.volume_number
                    ),
                });
            }
            if volume.data.is_empty() {
                return Err(ParError::InvalidFormat {
                    location: path.display().to_string(),
                    detail: "no parity data in volume".to_string(),
                });
            }
            if volume.header.set_hash != self.index_volume.header.set_hash {
                debug!(
                    "set hash mismatch between {} and {}",
                    self.index_path.display(),
                    path.display()
                );
            }
            if shard_byte_count == 0 {
                shard_byte_count = volume.data.len();
            } else if volume.data.len() != shard_byte_count {
                return Err(ParError::InvalidFormat {
                    location: path.display().to_string(),
                    detail: "mismatched parity data byte counts".to_string(),
                });
            }

            parity_data[i - 1] = Some(volume.data);
            highest = i;
        }

        self.shard_byte_count = shard_byte_count;
        self.parity_data = parity_data;
        self.parity_data.truncate(highest);
        Ok(())
    }

    fn padded_shards(&self) -> Result<Vec<Option<Vec<u8>>>> {
        self.file_data
            .iter()
            .map(|data| match data {
                Some(data) => {
                    if data.len() > self.shard_byte_count {
                        return Err(ParError::ShardLengthMismatch {
                            expected: self.shard_byte_count,
                            actual: data.len(),
                        });
                    }
                    let mut shard = data.clone();
                    shard.resize(self.shard_byte_count, 0);
                    Ok(Some(shard))
                }
                None => Ok(None),
            })
            .collect()
    }

    /// Check that all files and parity volumes are present and mutually
    /// consistent. Returns `true` when nothing needs repair.
    pub fn verify(&self, cancel: &CancelToken) -> Result<bool> {
        if self.file_data.iter().any(Option::is_none) {
            return Ok(false);
        }
        if self.parity_data.is_empty() || self.parity_data.iter().any(Option::is_none) {
            return Ok(false);
        }

        let data: Vec<Vec<u8>> = self
            .padded_shards()?
            .into_iter()
            .map(|s| s.expect("all file shards are present"))
            .collect();
        let parity: Vec<Vec<u8>> = self
            .parity_data
            .iter()
            .map(|s| s.clone().expect("all parity shards are present"))
            .collect();

        let coder = Coder::with_workers(data.len(), parity.len(), self.num_workers)?;
        coder.verify_parity(&data, &parity, cancel)
    }

    /// Whether enough parity is present to reconstruct everything absent.
    pub fn repair_is_possible(&self) -> bool {
        let missing = self.file_data.iter().filter(|d| d.is_none()).count();
        let parity_present = self.parity_data.iter().filter(|p| p.is_some()).count();
        missing <= parity_present
    }

    /// Reconstruct missing or corrupt files and write them back. Returns
    /// the repaired paths.
    pub fn repair(&mut self, check_parity: bool, cancel: &CancelToken) -> Result<Vec<PathBuf>> {
        let missing: Vec<usize> = (0..self.file_data.len())
            .filter(|&i| self.file_data[i].is_none())
            .collect();

        if missing.is_empty() {
            if check_parity && !self.verify(cancel)? {
                return Err(ParError::InvalidFormat {
                    location: self.index_path.display().to_string(),
                    detail: "parity volumes are inconsistent with the data files".to_string(),
                });
            }
            return Ok(Vec::new());
        }

        if self.parity_data.is_empty() {
            return Err(ParError::InsufficientRecovery);
        }

        let mut shards = self.padded_shards()?;
        let coder = Coder::with_workers(shards.len(), self.parity_data.len(), self.num_workers)?;
        coder.reconstruct(&mut shards, &self.parity_data, cancel)?;

        let dir = self.dir();
        let mut repaired = Vec::with_capacity(missing.len());
        for (n, &i) in missing.iter().enumerate() {
            let entry = &self.index_volume.entries[i];
            let shard = shards[i].as_ref().expect("reconstruction filled the gap");
            if entry.file_bytes as usize > shard.len() {
                return Err(ParError::ShardLengthMismatch {
                    expected: shard.len(),
                    actual: entry.file_bytes as usize,
                });
            }
            let restored = &shard[..entry.file_bytes as usize];

            if entry.hash != Md5Hash::zero() {
                let actual = checksum::md5(restored);
                if actual != entry.hash {
                    return Err(ParError::RepairFailed {
                        file_id: crate::domain::FileId::new(*entry.hash.as_bytes()),
                        expected: entry.hash,
                        actual,
                    });
                }
            }

            let path = dir.join(&entry.filename);
            let result = self.fileio.write_file(&path, restored);
            self.reporter.report(ReportEvent::DataFileWritten {
                index: n + 1,
                total: missing.len(),
                path: path.clone(),
                byte_count: restored.len(),
                error: result.as_ref().err().map(|e| e.to_string()),
            });
            result.map_err(|e| ParError::io(path.clone(), e))?;

            self.file_data[i] = Some(restored.to_vec());
            repaired.push(path);
        }

        Ok(repaired)
    }
}
