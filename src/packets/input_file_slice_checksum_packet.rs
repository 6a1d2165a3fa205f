//! IFSC packet: per-slice MD5 and CRC32 pairs for one file.
//!
//! The CRC32 gives the decoder a cheap first-pass filter when hunting for
//! displaced slices; the MD5 confirms a candidate. Both are computed over
//! the slice including its zero padding.

use binrw::{BinRead, BinWrite};

use crate::domain::{Crc32Value, FileId, Md5Hash, RecoverySetId};

use super::{packet_hash, PACKET_HEADER_BYTES};

pub const PACKET_TYPE: &[u8; 16] = b"PAR 2.0\0IFSC\0\0\0\0";

/// Serialized bytes per checksum pair.
const PAIR_BYTES: u64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, BinRead)]
#[br(little)]
pub struct SliceChecksum {
    pub md5: [u8; 16],
    pub crc32: u32,
}

impl SliceChecksum {
    pub fn new(md5: Md5Hash, crc32: Crc32Value) -> SliceChecksum {
        SliceChecksum {
            md5: *md5.as_bytes(),
            crc32: crc32.as_u32(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, BinRead)]
#[br(little, magic = b"PAR2\0PKT")]
pub struct InputFileSliceChecksumPacket {
    #[br(assert(
        length >= PACKET_HEADER_BYTES + 16
            && (length - PACKET_HEADER_BYTES - 16) % PAIR_BYTES == 0,
        "bad slice checksum packet length"
    ))]
    pub length: u64,
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub md5: Md5Hash,
    #[br(map = |x: [u8; 16]| RecoverySetId::new(x), pad_after = 16)]
    pub set_id: RecoverySetId,
    #[br(map = |x: [u8; 16]| FileId::new(x))]
    pub file_id: FileId,
    #[br(count = (length - PACKET_HEADER_BYTES - 16) / PAIR_BYTES)]
    pub slice_checksums: Vec<SliceChecksum>,
}

impl InputFileSliceChecksumPacket {
    pub fn new(
        set_id: RecoverySetId,
        file_id: FileId,
        slice_checksums: Vec<SliceChecksum>,
    ) -> InputFileSliceChecksumPacket {
        let body = Self::body_bytes_of(&file_id, &slice_checksums);
        InputFileSliceChecksumPacket {
            length: PACKET_HEADER_BYTES + body.len() as u64,
            md5: packet_hash(&set_id, PACKET_TYPE, &body),
            set_id,
            file_id,
            slice_checksums,
        }
    }

    fn body_bytes_of(file_id: &FileId, slice_checksums: &[SliceChecksum]) -> Vec<u8> {
        let mut body = Vec::with_capacity(16 + slice_checksums.len() * PAIR_BYTES as usize);
        body.extend_from_slice(file_id.as_bytes());
        for pair in slice_checksums {
            body.extend_from_slice(&pair.md5);
            body.extend_from_slice(&pair.crc32.to_le_bytes());
        }
        body
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        Self::body_bytes_of(&self.file_id, &self.slice_checksums)
    }

    pub fn verify(&self) -> bool {
        packet_hash(&self.set_id, PACKET_TYPE, &self.body_bytes()) == self.md5
            && self.length == PACKET_HEADER_BYTES + 16 + self.slice_checksums.len() as u64 * PAIR_BYTES
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        binrw::BinWriterExt::write_le(&mut cursor, self).expect("writing to memory cannot fail");
        cursor.into_inner()
    }
}

impl BinWrite for InputFileSliceChecksumPacket {
    type Args<'a> = ();

    fn write_options<W: std::io::Write + std::io::Seek>(
        &self,
        writer: &mut W,
        _endian: binrw::Endian,
        _args: Self::Args<'_>,
    ) -> binrw::BinResult<()> {
        writer.write_all(super::MAGIC_BYTES)?;
        writer.write_all(&self.length.to_le_bytes())?;
        writer.write_all(self.md5.as_bytes())?;
        writer.write_all(self.set_id.as_bytes())?;
        writer.write_all(PACKET_TYPE)?;
        writer.write_all(&self.body_bytes())?;
        Ok(())
    }
}
