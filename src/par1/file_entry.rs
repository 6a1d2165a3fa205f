//! PAR1 file-entry records.
//!
//! Each entry is a fixed 56-byte header followed by the filename in
//! UTF-16LE without a BOM. `entry_bytes` counts the whole serialized entry,
//! so the filename occupies `entry_bytes - 56` bytes and must be even.

use binrw::{BinRead, BinWrite};

use crate::domain::Md5Hash;

/// Serialized size of the fixed fields before the filename.
pub const FILE_ENTRY_FIXED_BYTES: u64 = 56;

/// Status bit: the file's data participates in the volume set.
pub const STATUS_SAVED: u64 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, BinRead)]
#[br(little)]
pub struct FileEntry {
    #[br(assert(
        entry_bytes > FILE_ENTRY_FIXED_BYTES && (entry_bytes - FILE_ENTRY_FIXED_BYTES) % 2 == 0,
        "invalid file entry byte count"
    ))]
    pub entry_bytes: u64,
    pub status: u64,
    pub file_bytes: u64,
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub hash: Md5Hash,
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub sixteen_k_hash: Md5Hash,
    #[br(count = entry_bytes - FILE_ENTRY_FIXED_BYTES, try_map = |v: Vec<u8>| decode_utf16le(&v))]
    pub filename: String,
}

impl FileEntry {
    /// Build an entry with `entry_bytes` already consistent with the
    /// filename's UTF-16 length.
    pub fn new(
        status: u64,
        file_bytes: u64,
        hash: Md5Hash,
        sixteen_k_hash: Md5Hash,
        filename: impl Into<String>,
    ) -> FileEntry {
        let filename = filename.into();
        let entry_bytes = FILE_ENTRY_FIXED_BYTES + encode_utf16le(&filename).len() as u64;
        FileEntry {
            entry_bytes,
            status,
            file_bytes,
            hash,
            sixteen_k_hash,
            filename,
        }
    }
}

impl BinWrite for FileEntry {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        let filename_bytes = encode_utf16le(&self.filename);
        let entry_bytes = FILE_ENTRY_FIXED_BYTES + filename_bytes.len() as u64;

        writer.write_all(&entry_bytes.to_le_bytes())?;
        writer.write_all(&self.status.to_le_bytes())?;
        writer.write_all(&self.file_bytes.to_le_bytes())?;
        writer.write_all(self.hash.as_bytes())?;
        writer.write_all(self.sixteen_k_hash.as_bytes())?;
        writer.write_all(&filename_bytes)?;
        Ok(())
    }
}

/// Decode a UTF-16LE byte run; surrogate pairs are honored.
pub fn decode_utf16le(bytes: &[u8]) -> Result<String, std::string::FromUtf16Error> {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units)
}

/// Encode a string as UTF-16LE without a BOM.
pub fn encode_utf16le(s: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(s.len() * 2);
    for unit in s.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}
