//! Creator packet: identifies the client that wrote the set.

use binrw::{BinRead, BinWrite};

use crate::domain::{Md5Hash, RecoverySetId};

use super::{packet_hash, PACKET_HEADER_BYTES};

pub const PACKET_TYPE: &[u8; 16] = b"PAR 2.0\0Creator\0";

#[derive(Debug, Clone, PartialEq, Eq, BinRead)]
#[br(little, magic = b"PAR2\0PKT")]
pub struct CreatorPacket {
    #[br(assert(length >= PACKET_HEADER_BYTES && length % 4 == 0, "bad creator packet length"))]
    pub length: u64,
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub md5: Md5Hash,
    #[br(map = |x: [u8; 16]| RecoverySetId::new(x), pad_after = 16)]
    pub set_id: RecoverySetId,
    #[br(count = length - PACKET_HEADER_BYTES)]
    pub creator: Vec<u8>,
}

impl CreatorPacket {
    /// Build a creator packet from a client identification string; the body
    /// is zero-padded to a multiple of 4.
    pub fn new(set_id: RecoverySetId, client: &str) -> CreatorPacket {
        let mut creator = client.as_bytes().to_vec();
        super::pad_to_multiple_of_4(&mut creator);
        let length = PACKET_HEADER_BYTES + creator.len() as u64;
        let md5 = packet_hash(&set_id, PACKET_TYPE, &creator);
        CreatorPacket {
            length,
            md5,
            set_id,
            creator,
        }
    }

    /// The client string with padding stripped.
    pub fn client(&self) -> String {
        let end = self
            .creator
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        String::from_utf8_lossy(&self.creator[..end]).into_owned()
    }

    /// Recompute the packet hash and compare against the stored one.
    pub fn verify(&self) -> bool {
        packet_hash(&self.set_id, PACKET_TYPE, &self.creator) == self.md5
            && self.length == PACKET_HEADER_BYTES + self.creator.len() as u64
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        binrw::BinWriterExt::write_le(&mut cursor, self).expect("writing to memory cannot fail");
        cursor.into_inner()
    }
}

impl BinWrite for CreatorPacket {
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
        writer.write_all(&self.creator)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binrw::BinReaderExt;
    use std::io::Cursor;

    #[test]
    fn round_trip() {
        let packet = CreatorPacket::new(RecoverySetId::new([3; 16]), "parrs test");
        assert!(packet.verify());
        assert_eq!(packet.length % 4, 0);

        let bytes = packet.to_bytes();
        assert_eq!(bytes.len() as u64, packet.length);

        let parsed: CreatorPacket = Cursor::new(&bytes).read_le().unwrap();
        assert_eq!(parsed, packet);
        assert_eq!(parsed.client(), "parrs test");
    }
}
