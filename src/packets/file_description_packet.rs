//! File description packet: identity and hashes of one protected file.

use binrw::{BinRead, BinWrite};

use crate::domain::{FileId, Md5Hash, RecoverySetId};

use super::{packet_hash, PACKET_HEADER_BYTES};

pub const PACKET_TYPE: &[u8; 16] = b"PAR 2.0\0FileDesc";

/// Body bytes before the filename: file ID, two hashes and the length.
const FIXED_BODY_BYTES: u64 = 56;

#[derive(Debug, Clone, PartialEq, Eq, BinRead)]
#[br(little, magic = b"PAR2\0PKT")]
pub struct FileDescriptionPacket {
    #[br(assert(
        length >= PACKET_HEADER_BYTES + FIXED_BODY_BYTES && length % 4 == 0,
        "bad file description packet length"
    ))]
    pub length: u64,
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub md5: Md5Hash,
    #[br(map = |x: [u8; 16]| RecoverySetId::new(x), pad_after = 16)]
    pub set_id: RecoverySetId,
    #[br(map = |x: [u8; 16]| FileId::new(x))]
    pub file_id: FileId,
    /// MD5 of the whole file.
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub file_hash: Md5Hash,
    /// MD5 of the first 16 KiB.
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub hash_16k: Md5Hash,
    pub file_length: u64,
    /// Filename bytes with the zero padding stripped.
    #[br(
        count = length - PACKET_HEADER_BYTES - FIXED_BODY_BYTES,
        map = |v: Vec<u8>| strip_trailing_zeros(v)
    )]
    pub file_name: Vec<u8>,
}

fn strip_trailing_zeros(mut v: Vec<u8>) -> Vec<u8> {
    while v.last() == Some(&0) {
        v.pop();
    }
    v
}

impl FileDescriptionPacket {
    /// Build a description; the file ID is derived from the 16k hash, the
    /// length and the name, exactly as decoders will recompute it.
    pub fn new(
        set_id: RecoverySetId,
        file_hash: Md5Hash,
        hash_16k: Md5Hash,
        file_length: u64,
        file_name: &[u8],
    ) -> FileDescriptionPacket {
        let file_id = crate::checksum::file_id(&hash_16k, file_length, file_name);
        let file_name = strip_trailing_zeros(file_name.to_vec());
        let body = Self::body_bytes_of(&file_id, &file_hash, &hash_16k, file_length, &file_name);
        FileDescriptionPacket {
            length: PACKET_HEADER_BYTES + body.len() as u64,
            md5: packet_hash(&set_id, PACKET_TYPE, &body),
            set_id,
            file_id,
            file_hash,
            hash_16k,
            file_length,
            file_name,
        }
    }

    fn body_bytes_of(
        file_id: &FileId,
        file_hash: &Md5Hash,
        hash_16k: &Md5Hash,
        file_length: u64,
        file_name: &[u8],
    ) -> Vec<u8> {
        let mut body = Vec::with_capacity(FIXED_BODY_BYTES as usize + file_name.len() + 3);
        body.extend_from_slice(file_id.as_bytes());
        body.extend_from_slice(file_hash.as_bytes());
        body.extend_from_slice(hash_16k.as_bytes());
        body.extend_from_slice(&file_length.to_le_bytes());
        body.extend_from_slice(file_name);
        super::pad_to_multiple_of_4(&mut body);
        body
    }

    pub fn body_bytes(&self) -> Vec<u8> {
        Self::body_bytes_of(
            &self.file_id,
            &self.file_hash,
            &self.hash_16k,
            self.file_length,
            &self.file_name,
        )
    }

    /// The filename as text.
    pub fn file_name_string(&self) -> String {
        String::from_utf8_lossy(&self.file_name).into_owned()
    }

    pub fn verify(&self) -> bool {
        let derived = crate::checksum::file_id(&self.hash_16k, self.file_length, &self.file_name);
        derived == self.file_id
            && packet_hash(&self.set_id, PACKET_TYPE, &self.body_bytes()) == self.md5
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        binrw::BinWriterExt::write_le(&mut cursor, self).expect("writing to memory cannot fail");
        cursor.into_inner()
    }
}

impl BinWrite for FileDescriptionPacket {
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
    use crate::checksum;
    use binrw::BinReaderExt;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let data = b"some file contents";
        let packet = FileDescriptionPacket::new(
            RecoverySetId::new([5; 16]),
            checksum::md5(data),
            checksum::md5_16k(data),
            data.len() as u64,
            b"name.dat",
        );
        assert!(packet.verify());
        assert_eq!(packet.length % 4, 0);

        let bytes = packet.to_bytes();
        let parsed: FileDescriptionPacket = Cursor::new(&bytes).read_le().unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.file_name_string(), "name.dat");
    }

    #[test]
    fn file_id_matches_recomputation() {
        let packet = FileDescriptionPacket::new(
            RecoverySetId::new([5; 16]),
            checksum::md5(b"x"),
            checksum::md5_16k(b"x"),
            1,
            b"x.bin",
        );
        assert_eq!(
            packet.file_id,
            checksum::file_id(&packet.hash_16k, 1, b"x.bin")
        );
    }
}
