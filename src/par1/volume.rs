//! PAR1 volume files.
//!
//! A volume is a fixed 96-byte header, a table of file entries, and a data
//! payload. The index volume (number 0) carries a freeform comment as its
//! payload; parity volume `n` carries the `n`-th parity shard. The header's
//! control hash is the MD5 of every byte from offset 0x20 onward and is the
//! only integrity check the format itself provides.

use std::io::Cursor;

use binrw::{BinRead, BinReaderExt, BinWrite, BinWriterExt};

use crate::checksum;
use crate::domain::Md5Hash;
use crate::errors::{ParError, Result};

use super::file_entry::FileEntry;

pub const VOLUME_MAGIC: &[u8; 8] = b"PAR\0\0\0\0\0";

/// The only version this codec reads or writes.
pub const VOLUME_VERSION: u32 = 0x0000_0900;

/// Serialized header size; also the offset of the first file entry.
pub const HEADER_BYTES: u64 = 0x60;

/// Control-hash coverage starts here (the set hash field).
pub const CONTROL_HASH_OFFSET: usize = 0x20;

#[derive(Debug, Clone, PartialEq, Eq, BinRead)]
#[br(little, magic = b"PAR\0\0\0\0\0")]
pub struct VolumeHeader {
    pub version: u32,
    pub client_version: u32,
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub control_hash: Md5Hash,
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub set_hash: Md5Hash,
    pub volume_number: u64,
    pub file_count: u64,
    pub file_list_offset: u64,
    pub file_list_bytes: u64,
    pub data_offset: u64,
    pub data_bytes: u64,
}

impl BinWrite for VolumeHeader {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        writer.write_all(VOLUME_MAGIC)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.client_version.to_le_bytes())?;
        writer.write_all(self.control_hash.as_bytes())?;
        writer.write_all(self.set_hash.as_bytes())?;
        writer.write_all(&self.volume_number.to_le_bytes())?;
        writer.write_all(&self.file_count.to_le_bytes())?;
        writer.write_all(&self.file_list_offset.to_le_bytes())?;
        writer.write_all(&self.file_list_bytes.to_le_bytes())?;
        writer.write_all(&self.data_offset.to_le_bytes())?;
        writer.write_all(&self.data_bytes.to_le_bytes())?;
        Ok(())
    }
}

/// One parsed volume: header, file table and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub header: VolumeHeader,
    pub entries: Vec<FileEntry>,
    pub data: Vec<u8>,
}

/// Parse a volume and verify its control hash.
pub fn read_volume(bytes: &[u8]) -> Result<Volume> {
    let invalid = |detail: String| ParError::InvalidFormat {
        location: "par1 volume".to_string(),
        detail,
    };

    let mut cursor = Cursor::new(bytes);
    let header: VolumeHeader = cursor
        .read_le()
        .map_err(|e| invalid(format!("bad header: {}", e)))?;

    if header.version != VOLUME_VERSION {
        return Err(invalid(format!(
            "unsupported version {:#010x}",
            header.version
        )));
    }

    let control_hash = checksum::md5(&bytes[CONTROL_HASH_OFFSET..]);
    if control_hash != header.control_hash {
        return Err(invalid("control hash mismatch".to_string()));
    }

    let mut entries = Vec::with_capacity(header.file_count.min(1024) as usize);
    for i in 0..header.file_count {
        let entry: FileEntry = cursor
            .read_le()
            .map_err(|e| invalid(format!("bad file entry {}: {}", i, e)))?;
        entries.push(entry);
    }

    let data = bytes[cursor.position() as usize..].to_vec();

    Ok(Volume {
        header,
        entries,
        data,
    })
}

/// Serialize a volume, deriving the layout fields and control hash from the
/// actual content.
pub fn write_volume(volume: &Volume) -> Result<Vec<u8>> {
    let to_io_err = |e: binrw::Error| ParError::InvalidFormat {
        location: "par1 volume".to_string(),
        detail: format!("serialization failed: {}", e),
    };

    let mut entry_bytes = Cursor::new(Vec::new());
    for entry in &volume.entries {
        entry_bytes.write_le(entry).map_err(to_io_err)?;
    }
    let entry_bytes = entry_bytes.into_inner();

    let header = VolumeHeader {
        control_hash: Md5Hash::zero(),
        file_count: volume.entries.len() as u64,
        file_list_offset: HEADER_BYTES,
        file_list_bytes: entry_bytes.len() as u64,
        data_offset: HEADER_BYTES + entry_bytes.len() as u64,
        data_bytes: volume.data.len() as u64,
        ..volume.header.clone()
    };

    let mut out = Cursor::new(Vec::new());
    out.write_le(&header).map_err(to_io_err)?;
    let mut out = out.into_inner();
    out.extend_from_slice(&entry_bytes);
    out.extend_from_slice(&volume.data);

    let control_hash = checksum::md5(&out[CONTROL_HASH_OFFSET..]);
    out[0x10..0x20].copy_from_slice(control_hash.as_bytes());

    Ok(out)
}
