//! The PAR2 packet container.
//!
//! A PAR2 file is a stream of length-prefixed packets, each carrying its
//! own MD5 and the ID of the recovery set it belongs to. Damage anywhere in
//! the stream only costs the packets it touches: the scanner hunts for the
//! packet magic, validates the candidate's length and hash, and resumes one
//! byte past the magic whenever a candidate turns out bad.

pub mod creator_packet;
pub mod file_description_packet;
pub mod input_file_slice_checksum_packet;
pub mod main_packet;
pub mod recovery_slice_packet;
pub mod set;

pub use creator_packet::CreatorPacket;
pub use file_description_packet::FileDescriptionPacket;
pub use input_file_slice_checksum_packet::{InputFileSliceChecksumPacket, SliceChecksum};
pub use main_packet::MainPacket;
pub use recovery_slice_packet::RecoverySlicePacket;
pub use set::PacketSet;

use std::io::Cursor;

use binrw::BinReaderExt;
use log::debug;
use md5::{Digest, Md5};

use crate::domain::{Md5Hash, RecoverySetId};
use crate::reporters::{ReportEvent, Reporter};

pub const MAGIC_BYTES: &[u8; 8] = b"PAR2\0PKT";

/// Bytes of packet header before the body: magic, length, hash, set ID and
/// type.
pub const PACKET_HEADER_BYTES: u64 = 64;

/// The packet hash authenticates everything after the hash field itself.
pub fn packet_hash(set_id: &RecoverySetId, packet_type: &[u8; 16], body: &[u8]) -> Md5Hash {
    let mut hasher = Md5::new();
    hasher.update(set_id.as_bytes());
    hasher.update(packet_type);
    hasher.update(body);
    Md5Hash::new(hasher.finalize().into())
}

/// A packet whose type this implementation does not interpret. Kept so the
/// front end can report it; never considered when resolving the set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownPacket {
    pub set_id: RecoverySetId,
    pub packet_type: [u8; 16],
    pub body: Vec<u8>,
}

#[derive(Debug)]
pub enum Packet {
    Creator(CreatorPacket),
    Main(MainPacket),
    FileDescription(FileDescriptionPacket),
    InputFileSliceChecksum(InputFileSliceChecksumPacket),
    RecoverySlice(RecoverySlicePacket),
    Unknown(UnknownPacket),
}

impl Packet {
    pub fn set_id(&self) -> RecoverySetId {
        match self {
            Packet::Creator(p) => p.set_id,
            Packet::Main(p) => p.set_id,
            Packet::FileDescription(p) => p.set_id,
            Packet::InputFileSliceChecksum(p) => p.set_id,
            Packet::RecoverySlice(p) => p.set_id,
            Packet::Unknown(p) => p.set_id,
        }
    }
}

fn find_magic(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(MAGIC_BYTES.len())
        .position(|window| window == MAGIC_BYTES)
}

fn parse_typed(packet_type: &[u8; 16], packet_bytes: &[u8]) -> binrw::BinResult<Option<Packet>> {
    let mut cursor = Cursor::new(packet_bytes);
    let packet = match packet_type {
        creator_packet::PACKET_TYPE => Some(Packet::Creator(cursor.read_le()?)),
        main_packet::PACKET_TYPE => Some(Packet::Main(cursor.read_le()?)),
        file_description_packet::PACKET_TYPE => Some(Packet::FileDescription(cursor.read_le()?)),
        input_file_slice_checksum_packet::PACKET_TYPE => {
            Some(Packet::InputFileSliceChecksum(cursor.read_le()?))
        }
        recovery_slice_packet::PACKET_TYPE => Some(Packet::RecoverySlice(cursor.read_le()?)),
        _ => None,
    };
    Ok(packet)
}

/// Scan a buffer for valid packets.
///
/// Candidates with a bad length or hash are dropped and the scan resumes
/// one byte past their magic. Unrecognized packet types are preserved as
/// [`UnknownPacket`]s.
pub fn parse_packets(bytes: &[u8], reporter: &dyn Reporter) -> Vec<Packet> {
    let mut packets = Vec::new();
    let mut pos = 0usize;

    while pos + PACKET_HEADER_BYTES as usize <= bytes.len() {
        let Some(found) = find_magic(&bytes[pos..]) else {
            break;
        };
        let start = pos + found;
        if start + PACKET_HEADER_BYTES as usize > bytes.len() {
            break;
        }

        let length = u64::from_le_bytes(bytes[start + 8..start + 16].try_into().unwrap());
        let valid_length = length >= PACKET_HEADER_BYTES
            && length % 4 == 0
            && usize::try_from(length).is_ok_and(|len| {
                start
                    .checked_add(len)
                    .is_some_and(|end| end <= bytes.len())
            });
        if !valid_length {
            pos = start + 1;
            continue;
        }
        let length = length as usize;

        let stored_hash: [u8; 16] = bytes[start + 16..start + 32].try_into().unwrap();
        let computed_hash = crate::checksum::md5(&bytes[start + 32..start + length]);
        if computed_hash != stored_hash {
            debug!("packet at offset {} failed its hash check", start);
            pos = start + 1;
            continue;
        }

        let packet_type: [u8; 16] = bytes[start + 48..start + 64].try_into().unwrap();
        match parse_typed(&packet_type, &bytes[start..start + length]) {
            Ok(Some(packet)) => packets.push(packet),
            Ok(None) => {
                reporter.report(ReportEvent::UnknownPacketSkipped {
                    packet_type,
                    byte_count: length,
                });
                let set_id: [u8; 16] = bytes[start + 32..start + 48].try_into().unwrap();
                packets.push(Packet::Unknown(UnknownPacket {
                    set_id: RecoverySetId::new(set_id),
                    packet_type,
                    body: bytes[start + 64..start + length].to_vec(),
                }));
            }
            Err(e) => {
                // Hash-valid but structurally malformed; skip the whole
                // packet rather than rescanning its interior.
                debug!("packet at offset {} failed to parse: {}", start, e);
            }
        }
        pos = start + length;
    }

    packets
}

/// Zero-pad `bytes` in place to the next multiple of 4, as packet bodies
/// require.
pub fn pad_to_multiple_of_4(bytes: &mut Vec<u8>) {
    let rem = bytes.len() % 4;
    if rem != 0 {
        bytes.resize(bytes.len() + 4 - rem, 0);
    }
}
