//! PAR2 archive creation.
//!
//! Files are cut into slices of a common size; the slices, concatenated in
//! recovery-set order, are the input shards of the Reed-Solomon coder. The
//! encoder emits an index file holding the critical packets and one or more
//! recovery files, each repeating the critical packets ahead of its
//! recovery slices.

use std::path::{Path, PathBuf};

use crate::checksum;
use crate::domain::{FileId, RecoverySetId};
use crate::errors::{ParError, Result};
use crate::fileio::FileIO;
use crate::packets::{
    CreatorPacket, FileDescriptionPacket, InputFileSliceChecksumPacket, MainPacket,
    RecoverySlicePacket, SliceChecksum,
};
use crate::reporters::{ReportEvent, Reporter};
use crate::rs16::{CancelToken, Coder};

/// Client string written into creator packets.
pub const CREATOR: &str = concat!("parrs ", env!("CARGO_PKG_VERSION"));

/// Default slice size in bytes.
pub const DEFAULT_SLICE_BYTE_COUNT: usize = 2000;

/// How recovery slices are distributed across output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryFileLayout {
    /// One recovery file per slice.
    #[default]
    OnePerSlice,
    /// Doubling group sizes: 1, 2, 4, ... slices per file.
    PowerOfTwo,
}

impl RecoveryFileLayout {
    /// Group sizes covering `total` slices.
    fn group_sizes(self, total: usize) -> Vec<usize> {
        match self {
            RecoveryFileLayout::OnePerSlice => vec![1; total],
            RecoveryFileLayout::PowerOfTwo => {
                let mut sizes = Vec::new();
                let mut remaining = total;
                let mut size = 1;
                while remaining > 0 {
                    let take = size.min(remaining);
                    sizes.push(take);
                    remaining -= take;
                    size *= 2;
                }
                sizes
            }
        }
    }
}

struct InputFile {
    name: Vec<u8>,
    data: Vec<u8>,
    file_id: FileId,
}

pub struct Encoder<'a> {
    fileio: &'a dyn FileIO,
    reporter: &'a dyn Reporter,
    file_paths: Vec<PathBuf>,
    slice_byte_count: usize,
    num_recovery: usize,
    num_workers: usize,
    layout: RecoveryFileLayout,

    files: Vec<InputFile>,
    set_id: RecoverySetId,
    main: Option<MainPacket>,
    descriptions: Vec<FileDescriptionPacket>,
    checksums: Vec<InputFileSliceChecksumPacket>,
    recovery_shards: Vec<Vec<u8>>,
}

impl<'a> Encoder<'a> {
    pub fn new(
        fileio: &'a dyn FileIO,
        reporter: &'a dyn Reporter,
        file_paths: Vec<PathBuf>,
        slice_byte_count: usize,
        num_recovery: usize,
        num_workers: usize,
    ) -> Result<Encoder<'a>> {
        if file_paths.is_empty() {
            return Err(ParError::InvalidConfiguration(
                "no data files given".to_string(),
            ));
        }
        if slice_byte_count == 0 || slice_byte_count % 4 != 0 {
            return Err(ParError::InvalidConfiguration(format!(
                "slice byte count must be a positive multiple of 4, got {}",
                slice_byte_count
            )));
        }
        if num_recovery == 0 {
            return Err(ParError::InvalidConfiguration(
                "need at least one recovery slice".to_string(),
            ));
        }

        Ok(Encoder {
            fileio,
            reporter,
            file_paths,
            slice_byte_count,
            num_recovery,
            num_workers,
            layout: RecoveryFileLayout::default(),
            files: Vec::new(),
            set_id: RecoverySetId::new([0; 16]),
            main: None,
            descriptions: Vec::new(),
            checksums: Vec::new(),
            recovery_shards: Vec::new(),
        })
    }

    pub fn with_layout(mut self, layout: RecoveryFileLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Load the input files, derive their IDs, and build all critical
    /// packets. Two files deriving the same ID is fatal.
    pub fn load_file_data(&mut self) -> Result<()> {
        let total = self.file_paths.len();
        let mut files = Vec::with_capacity(total);

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

            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned().into_bytes())
                .unwrap_or_default();
            let file_id = checksum::file_id(
                &checksum::md5_16k(&data),
                data.len() as u64,
                &name,
            );
            files.push(InputFile {
                name,
                data,
                file_id,
            });
        }

        // Recovery-set order is ascending file ID; it fixes the global
        // slice numbering used by the coder.
        files.sort_by_key(|f| f.file_id);
        for pair in files.windows(2) {
            if pair[0].file_id == pair[1].file_id {
                return Err(ParError::DuplicateFileId {
                    file_id: pair[1].file_id,
                    filename: String::from_utf8_lossy(&pair[1].name).into_owned(),
                });
            }
        }

        let file_ids: Vec<FileId> = files.iter().map(|f| f.file_id).collect();
        let main = MainPacket::new(self.slice_byte_count as u64, file_ids, Vec::new());
        self.set_id = main.set_id;

        self.descriptions = files
            .iter()
            .map(|f| {
                FileDescriptionPacket::new(
                    self.set_id,
                    checksum::md5(&f.data),
                    checksum::md5_16k(&f.data),
                    f.data.len() as u64,
                    &f.name,
                )
            })
            .collect();

        self.checksums = files
            .iter()
            .map(|f| {
                let pairs: Vec<SliceChecksum> = f
                    .data
                    .chunks(self.slice_byte_count)
                    .map(|slice| {
                        let (md5, crc) = checksum::padded_checksums(slice, self.slice_byte_count);
                        SliceChecksum::new(md5, crc)
                    })
                    .collect();
                InputFileSliceChecksumPacket::new(self.set_id, f.file_id, pairs)
            })
            .collect();

        self.main = Some(main);
        self.files = files;
        Ok(())
    }

    fn input_shards(&self) -> Vec<Vec<u8>> {
        let mut shards = Vec::new();
        for file in &self.files {
            for slice in file.data.chunks(self.slice_byte_count) {
                let mut shard = slice.to_vec();
                shard.resize(self.slice_byte_count, 0);
                shards.push(shard);
            }
        }
        shards
    }

    /// Number of input slices across the whole set.
    pub fn input_slice_count(&self) -> usize {
        self.files
            .iter()
            .map(|f| f.data.len().div_ceil(self.slice_byte_count))
            .sum()
    }

    /// Compute the recovery shards.
    pub fn compute_recovery_data(&mut self, cancel: &CancelToken) -> Result<()> {
        let shards = self.input_shards();
        if shards.is_empty() {
            return Err(ParError::InvalidConfiguration(
                "input files contain no data to protect".to_string(),
            ));
        }
        let coder = Coder::with_workers(shards.len(), self.num_recovery, self.num_workers)?;
        self.recovery_shards = coder.generate_parity(&shards, cancel)?;
        Ok(())
    }

    fn critical_packet_bytes(&self, main: &MainPacket) -> Vec<u8> {
        // Fixed emission order: creator, main, descriptions, checksums.
        let mut bytes = CreatorPacket::new(self.set_id, CREATOR).to_bytes();
        bytes.extend_from_slice(&main.to_bytes());
        for desc in &self.descriptions {
            bytes.extend_from_slice(&desc.to_bytes());
        }
        for sums in &self.checksums {
            bytes.extend_from_slice(&sums.to_bytes());
        }
        bytes
    }

    /// Write the index file and the recovery files. `index_path` supplies
    /// the base name; recovery files are named
    /// `<base>.vol<start>+<count>.par2`.
    pub fn write(&self, index_path: &Path) -> Result<Vec<PathBuf>> {
        let main = self.main.as_ref().ok_or_else(|| {
            ParError::InvalidConfiguration("write called before load_file_data".to_string())
        })?;

        let exponents = crate::rs16::recovery_exponents(self.num_recovery)?;

        let base = base_name(index_path);
        let critical = self.critical_packet_bytes(main);
        let mut written = Vec::new();

        let index_bytes = critical.clone();
        self.write_one(index_path, &index_bytes, 0, 0)?;
        written.push(index_path.to_path_buf());

        let group_sizes = self.layout.group_sizes(self.recovery_shards.len());
        let digits = volume_digits(self.recovery_shards.len());
        let mut start = 0usize;
        for count in group_sizes {
            let path = index_path.with_file_name(format!(
                "{}.vol{:0digits$}+{:0digits$}.par2",
                base,
                start,
                count,
                digits = digits
            ));

            let mut bytes = critical.clone();
            let mut data_bytes = 0usize;
            for r in start..start + count {
                let packet = RecoverySlicePacket::new(
                    self.set_id,
                    exponents[r] as u32,
                    self.recovery_shards[r].clone(),
                );
                data_bytes += packet.recovery_data.len();
                bytes.extend_from_slice(&packet.to_bytes());
            }

            self.write_one(&path, &bytes, start + 1, data_bytes)?;
            written.push(path);
            start += count;
        }

        Ok(written)
    }

    fn write_one(&self, path: &Path, bytes: &[u8], index: usize, data_bytes: usize) -> Result<()> {
        let result = self.fileio.write_file(path, bytes);
        self.reporter.report(ReportEvent::VolumeFileWritten {
            index,
            total: self.recovery_shards.len() + 1,
            path: path.to_path_buf(),
            data_byte_count: data_bytes,
            byte_count: bytes.len(),
        });
        result.map_err(|e| ParError::io(path.to_path_buf(), e))
    }
}

/// The index file's name without its `.par2` extension.
fn base_name(index_path: &Path) -> String {
    let name = index_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.strip_suffix(".par2").map(str::to_owned).unwrap_or(name)
}

/// Width of the volume numbers in recovery file names; at least two
/// digits, widened for very large sets.
fn volume_digits(total: usize) -> usize {
    let mut digits = 2;
    let mut bound = 100;
    while total > bound {
        digits += 1;
        bound *= 10;
    }
    digits
}
