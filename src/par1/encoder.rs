//! PAR1 volume-set creation.
//!
//! Every data file becomes one shard, padded with zeros to the longest
//! file's length (rounded up to a multiple of 4). One parity shard is
//! produced per requested parity volume and written to `.p01 ..= .p99`
//! alongside an index volume with an empty payload.

use std::path::{Path, PathBuf};

use crate::checksum;
use crate::errors::{ParError, Result};
use crate::fileio::FileIO;
use crate::reporters::{ReportEvent, Reporter};
use crate::rs16::{CancelToken, Coder};

use super::file_entry::{FileEntry, STATUS_SAVED};
use super::volume::{write_volume, Volume, VolumeHeader, VOLUME_VERSION};
use crate::domain::Md5Hash;

/// PAR1 can name at most 99 parity volumes.
pub const MAX_PARITY_VOLUMES: usize = 99;

/// Builds a PAR1 volume set. Load, compute and write are separate stages
/// so the front end can report between them and cancellation can land
/// inside the parity computation.
pub struct Encoder<'a> {
    fileio: &'a dyn FileIO,
    reporter: &'a dyn Reporter,
    file_paths: Vec<PathBuf>,
    volume_count: usize,
    num_workers: usize,

    shard_byte_count: usize,
    file_data: Vec<Vec<u8>>,
    parity_data: Vec<Vec<u8>>,
}

impl<'a> Encoder<'a> {
    pub fn new(
        fileio: &'a dyn FileIO,
        reporter: &'a dyn Reporter,
        file_paths: Vec<PathBuf>,
        volume_count: usize,
        num_workers: usize,
    ) -> Result<Encoder<'a>> {
        if file_paths.is_empty() {
            return Err(ParError::InvalidConfiguration(
                "no data files given".to_string(),
            ));
        }
        if volume_count == 0 || volume_count > MAX_PARITY_VOLUMES {
            return Err(ParError::InvalidConfiguration(format!(
                "parity volume count must be between 1 and {}, got {}",
                MAX_PARITY_VOLUMES, volume_count
            )));
        }

        Ok(Encoder {
            fileio,
            reporter,
            file_paths,
            volume_count,
            num_workers,
            shard_byte_count: 0,
            file_data: Vec::new(),
            parity_data: Vec::new(),
        })
    }

    /// Read every data file into memory and fix the shard length.
    pub fn load_file_data(&mut self) -> Result<()> {
        let total = self.file_paths.len();
        let mut file_data = Vec::with_capacity(total);
        let mut longest = 0usize;

        for (i, path) in self.file_paths.iter().enumerate() {
            let result = self.fileio.read_file(path);
            self.reporter.report(ReportEvent::DataFileLoaded {
                index: i + 1,
                total,
                path: path.clone(),
                byte_count: result.as_ref().map(|d| d.len()).unwrap_or(0),
                hits: 0,
                misses: 0,
                error: result.as_ref().err().map(|e| e.to_string()),
            });
            let data = result.map_err(|e| ParError::io(path.clone(), e))?;
            longest = longest.max(data.len());
            file_data.push(data);
        }

        // Shards are runs of 16-bit field elements, kept 4-byte aligned.
        self.shard_byte_count = longest.div_ceil(4) * 4;
        self.file_data = file_data;
        Ok(())
    }

    fn padded_shards(&self) -> Vec<Vec<u8>> {
        self.file_data
            .iter()
            .map(|data| {
                let mut shard = data.clone();
                shard.resize(self.shard_byte_count, 0);
                shard
            })
            .collect()
    }

    /// Compute the parity shards.
    pub fn compute_parity_data(&mut self, cancel: &CancelToken) -> Result<()> {
        let coder = Coder::with_workers(self.file_data.len(), self.volume_count, self.num_workers)?;
        self.parity_data = coder.generate_parity(&self.padded_shards(), cancel)?;
        Ok(())
    }

    fn build_entries(&self) -> Vec<FileEntry> {
        self.file_paths
            .iter()
            .zip(&self.file_data)
            .map(|(path, data)| {
                let basename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                FileEntry::new(
                    STATUS_SAVED,
                    data.len() as u64,
                    checksum::md5(data),
                    checksum::md5_16k(data),
                    basename,
                )
            })
            .collect()
    }

    fn set_hash(&self) -> Md5Hash {
        let hashes: Vec<Md5Hash> = self.file_data.iter().map(|d| checksum::md5(d)).collect();
        checksum::set_hash(&hashes)
    }

    /// Write the index volume and one volume per parity shard, deriving the
    /// output names from `index_path`'s stem.
    pub fn write(&self, index_path: &Path) -> Result<Vec<PathBuf>> {
        let entries = self.build_entries();
        let template = Volume {
            header: VolumeHeader {
                version: VOLUME_VERSION,
                client_version: VOLUME_VERSION,
                control_hash: Md5Hash::zero(),
                set_hash: self.set_hash(),
                volume_number: 0,
                file_count: 0,
                file_list_offset: 0,
                file_list_bytes: 0,
                data_offset: 0,
                data_bytes: 0,
            },
            entries,
            data: Vec::new(),
        };

        let base = index_path.with_extension("");
        let total = self.parity_data.len() + 1;
        let mut written = Vec::with_capacity(total);

        let index_volume_path = base.with_extension("par");
        let index_bytes = write_volume(&template)?;
        self.write_one(&index_volume_path, &index_bytes, 1, total, 0)?;
        written.push(index_volume_path);

        for (i, shard) in self.parity_data.iter().enumerate() {
            let mut volume = template.clone();
            volume.header.volume_number = (i + 1) as u64;
            volume.data = shard.clone();
            let bytes = write_volume(&volume)?;

            let path = base.with_extension(format!("p{:02}", i + 1));
            self.write_one(&path, &bytes, i + 2, total, shard.len())?;
            written.push(path);
        }

        Ok(written)
    }

    fn write_one(
        &self,
        path: &Path,
        bytes: &[u8],
        index: usize,
        total: usize,
        data_byte_count: usize,
    ) -> Result<()> {
        let result = self.fileio.write_file(path, bytes);
        self.reporter.report(ReportEvent::VolumeFileWritten {
            index,
            total,
            path: path.to_path_buf(),
            data_byte_count,
            byte_count: bytes.len(),
        });
        result.map_err(|e| ParError::io(path.to_path_buf(), e))
    }
}
