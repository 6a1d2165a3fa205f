//! Recovery slice packet: one parity shard and the exponent that labels it.

use binrw::{BinRead, BinWrite};

use crate::domain::{Md5Hash, RecoverySetId};

use super::{packet_hash, PACKET_HEADER_BYTES};

pub const PACKET_TYPE: &[u8; 16] = b"PAR 2.0\0RecvSlic";

#[derive(Debug, Clone, PartialEq, Eq, BinRead)]
#[br(little, magic = b"PAR2\0PKT")]
pub struct RecoverySlicePacket {
    #[br(assert(
        length >= PACKET_HEADER_BYTES + 4 && length % 4 == 0,
        "bad recovery slice packet length"
    ))]
    pub length: u64,
    #[br(map = |x: [u8; 16]| Md5Hash::new(x))]
    pub md5: Md5Hash,
    #[br(map = |x: [u8; 16]| RecoverySetId::new(x), pad_after = 16)]
    pub set_id: RecoverySetId,
    pub exponent: u32,
    #[br(count = length - PACKET_HEADER_BYTES - 4)]
    pub recovery_data: Vec<u8>,
}

impl RecoverySlicePacket {
    pub fn new(set_id: RecoverySetId, exponent: u32, recovery_data: Vec<u8>) -> RecoverySlicePacket {
        let body = Self::body_bytes_of(exponent, &recovery_data);
        RecoverySlicePacket {
            length: PACKET_HEADER_BYTES + body.len() as u64,
            md5: packet_hash(&set_id, PACKET_TYPE, &body),
            set_id,
            exponent,
            recovery_data,
        }
    }

    fn body_bytes_of(exponent: u32, recovery_data: &[u8]) -> Vec<u8> {
        let mut body = Vec::with_capacity(4 + recovery_data.len());
        body.extend_from_slice(&exponent.to_le_bytes());
        body.extend_from_slice(recovery_data);
        body
    }

    pub fn verify(&self) -> bool {
        let body = Self::body_bytes_of(self.exponent, &self.recovery_data);
        packet_hash(&self.set_id, PACKET_TYPE, &body) == self.md5
            && self.length == PACKET_HEADER_BYTES + body.len() as u64
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut cursor = std::io::Cursor::new(Vec::new());
        binrw::BinWriterExt::write_le(&mut cursor, self).expect("writing to memory cannot fail");
        cursor.into_inner()
    }
}

impl BinWrite for RecoverySlicePacket {
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
        writer.write_all(&self.exponent.to_le_bytes())?;
        writer.write_all(&self.recovery_data)?;
        Ok(())
    }
}
