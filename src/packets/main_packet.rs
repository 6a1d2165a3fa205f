//! Main packet: the slice size and the membership of the recovery set.
//!
//! The recovery set ID that every other packet carries is defined as the
//! MD5 of this packet's body, which ties the whole set to one slice layout
//! and one ordered list of files.

use binrw::{BinRead, BinWrite};

use crate::domain::{FileId, Md5Hash, RecoverySetId};

use super::{packet_hash, PACKET_HEADER_BYTES};

pub const PACKET_TYPE: &[u8; 16] = b"PAR 2.0\0Main\0\0\0\0";

/// Body bytes before the file ID lists: slice size and recovery count.
const FIXED_BODY_BYTES: u64 = 12;

#[derive(Debug, Clone, PartialEq, Eq, BinRead)]
#[br(little, magic = b"PAR2\0PKT")]
pub struct MainPacket {
    #[br(assert(
        length >= PACKET_HEADER_BYTES + FIXED_BODY_BYTES
            && (length - PACKET_HEADER_BYTES - FIXED_BODY_BYTES) % 16 == 0,
        "bad main packet length"
    ))]
    pub length: u64,
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub md5: Md5Hash,
    #[br(map = |x: [u8; 16]| RecoverySetId::new(x), pad_after = 16)]
    pub set_id: RecoverySetId,
    pub slice_size: u64,
    #[br(assert(
        (recovery_count as u64) <= (length - PACKET_HEADER_BYTES - FIXED_BODY_BYTES) / 16,
        "recovery count exceeds packet size"
    ))]
    pub recovery_count: u32,
    #[br(count = recovery_count, map = |v: Vec<[u8; 16]>| v.into_iter().map(FileId::new).collect())]
    pub file_ids: Vec<FileId>,
    #[br(
        count = (length - PACKET_HEADER_BYTES - FIXED_BODY_BYTES) / 16 - recovery_count as u64,
        map = |v: Vec<[u8; 16]>| v.into_iter().map(FileId::new).collect()
    )]
    pub non_recovery_file_ids: Vec<FileId>,
}

impl MainPacket {
    /// Build a main packet; both ID lists must already be sorted ascending.
    /// The set ID is derived from the body.
    pub fn new(
        slice_size: u64,
        file_ids: Vec<FileId>,
        non_recovery_file_ids: Vec<FileId>,
    ) -> MainPacket {
        let body = Self::body_bytes_of(slice_size, &file_ids, &non_recovery_file_ids);
        let set_id = RecoverySetId::new(*crate::checksum::md5(&body).as_bytes());
        let md5 = packet_hash(&set_id, PACKET_TYPE, &body);
        MainPacket {
            length: PACKET_HEADER_BYTES + body.len() as u64,
            md5,
            set_id,
            slice_size,
            recovery_count: file_ids.len() as u32,
            file_ids,
            non_recovery_file_ids,
        }
    }

    fn body_bytes_of(
        slice_size: u64,
        file_ids: &[FileId],
        non_recovery_file_ids: &[FileId],
    ) -> Vec<u8> {
        let mut body = Vec::with_capacity(
            FIXED_BODY_BYTES as usize + 16 * (file_ids.len() + non_recovery_file_ids.len()),
        );
        body.extend_from_slice(&slice_size.to_le_bytes());
        body.extend_from_slice(&(file_ids.len() as u32).to_le_bytes());
        for id in file_ids {
            body.extend_from_slice(id.as_bytes());
        }
        for id in non_recovery_file_ids {
            body.extend_from_slice(id.as_bytes());
        }
        body
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        Self::body_bytes_of(self.slice_size, &self.file_ids, &self.non_recovery_file_ids)
    }

    /// A main packet is only authentic if its body hashes to its own set
    /// ID, in addition to the ordinary packet hash.
    pub fn verify(&self) -> bool {
        let body = self.body_bytes();
        crate::checksum::md5(&body) == *self.set_id.as_bytes()
            && packet_hash(&self.set_id, PACKET_TYPE, &body) == self.md5
            && self.length == PACKET_HEADER_BYTES + body.len() as u64
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        binrw::BinWriterExt::write_le(&mut cursor, self).expect("writing to memory cannot fail");
        cursor.into_inner()
    }
}

impl BinWrite for MainPacket {
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

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinReaderExt;
    use std::io::Cursor;

    #[test]
    fn round_trip_and_set_id_derivation() {
        let ids = vec![FileId::new([1; 16]), FileId::new([2; 16])];
        let packet = MainPacket::new(2000, ids, vec![FileId::new([9; 16])]);
        assert!(packet.verify());

        let bytes = packet.to_bytes();
        assert_eq!(bytes.len() as u64, packet.length);

        let parsed: MainPacket = Cursor::new(&bytes).read_le().unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.file_ids.len(), 2);
        assert_eq!(parsed.non_recovery_file_ids.len(), 1);
    }

    #[test]
    fn tampered_body_fails_verify() {
        let packet = MainPacket::new(2000, vec![FileId::new([1; 16])], vec![]);
        let mut tampered = packet.clone();
        tampered.slice_size = 4000;
        assert!(!tampered.verify());
    }
}
