//! Resolving a pile of parsed packets into one usable recovery set.
//!
//! A PAR2 file may contain packets from several sets, duplicates from
//! repeated volumes, damaged strays and unknown types. Resolution groups
//! the valid packets by set ID, keeps the first instance of each keyed
//! packet, and picks the set with the most recovery slices among those
//! whose main packet authenticates (its body MD5 is the set ID) and that
//! carry at least one file description and one recovery slice.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::domain::{FileId, RecoverySetId};
use crate::errors::{ParError, Result};
use crate::reporters::{PacketKind, ReportEvent, Reporter};

use super::{
    CreatorPacket, FileDescriptionPacket, InputFileSliceChecksumPacket, MainPacket, Packet,
    RecoverySlicePacket,
};

/// The packets of one recovery set, deduplicated and keyed.
#[derive(Debug)]
pub struct PacketSet {
    pub set_id: RecoverySetId,
    pub creator: Option<CreatorPacket>,
    pub main: MainPacket,
    pub file_descriptions: FxHashMap<FileId, FileDescriptionPacket>,
    pub slice_checksums: FxHashMap<FileId, InputFileSliceChecksumPacket>,
    /// Recovery slices ordered by exponent.
    pub recovery_slices: BTreeMap<u32, RecoverySlicePacket>,
}

#[derive(Debug, Default)]
struct Candidate {
    creator: Option<CreatorPacket>,
    main: Option<MainPacket>,
    file_descriptions: FxHashMap<FileId, FileDescriptionPacket>,
    slice_checksums: FxHashMap<FileId, InputFileSliceChecksumPacket>,
    recovery_slices: BTreeMap<u32, RecoverySlicePacket>,
}

impl Candidate {
    fn add(&mut self, packet: Packet, reporter: &dyn Reporter) {
        match packet {
            Packet::Creator(p) => {
                if self.creator.is_none() {
                    self.creator = Some(p);
                }
            }
            Packet::Main(p) => match &self.main {
                None => {
                    if p.verify() {
                        self.main = Some(p);
                    }
                }
                Some(existing) if *existing != p => {
                    reporter.report(ReportEvent::DuplicatePacketMismatch {
                        kind: PacketKind::Main,
                        detail: format!("set {}", p.set_id),
                    });
                }
                Some(_) => {}
            },
            Packet::FileDescription(p) => {
                match self.file_descriptions.get(&p.file_id) {
                    None => {
                        self.file_descriptions.insert(p.file_id, p);
                    }
                    Some(existing) if *existing != p => {
                        reporter.report(ReportEvent::DuplicatePacketMismatch {
                            kind: PacketKind::FileDescription,
                            detail: format!("file {}", p.file_id),
                        });
                    }
                    Some(_) => {}
                }
            }
            Packet::InputFileSliceChecksum(p) => match self.slice_checksums.get(&p.file_id) {
                None => {
                    self.slice_checksums.insert(p.file_id, p);
                }
                Some(existing) if *existing != p => {
                    reporter.report(ReportEvent::DuplicatePacketMismatch {
                        kind: PacketKind::InputFileSliceChecksum,
                        detail: format!("file {}", p.file_id),
                    });
                }
                Some(_) => {}
            },
            Packet::RecoverySlice(p) => match self.recovery_slices.get(&p.exponent) {
                None => {
                    self.recovery_slices.insert(p.exponent, p);
                }
                Some(existing) if *existing != p => {
                    reporter.report(ReportEvent::DuplicatePacketMismatch {
                        kind: PacketKind::RecoverySlice,
                        detail: format!("exponent {}", p.exponent),
                    });
                }
                Some(_) => {}
            },
            Packet::Unknown(_) => {}
        }
    }

    fn is_usable(&self) -> bool {
        self.main.is_some()
            && !self.file_descriptions.is_empty()
            && !self.recovery_slices.is_empty()
    }
}

impl PacketSet {
    /// Resolve the packet pool into the chosen recovery set; packets from
    /// losing sets are reported and dropped.
    pub fn resolve(packets: Vec<Packet>, reporter: &dyn Reporter) -> Result<PacketSet> {
        let mut candidates: FxHashMap<RecoverySetId, Candidate> = FxHashMap::default();
        for packet in packets {
            candidates
                .entry(packet.set_id())
                .or_default()
                .add(packet, reporter);
        }

        // Most recovery slices wins; ties break toward the smallest set ID
        // so resolution stays deterministic.
        let chosen_id = candidates
            .iter()
            .filter(|(_, c)| c.is_usable())
            .max_by(|(id_a, a), (id_b, b)| {
                a.recovery_slices
                    .len()
                    .cmp(&b.recovery_slices.len())
                    .then_with(|| id_b.as_bytes().cmp(id_a.as_bytes()))
            })
            .map(|(id, _)| *id)
            .ok_or_else(|| {
                ParError::InsufficientCriticalData(
                    "no recovery set with a valid main packet, file descriptions \
                     and recovery slices"
                        .to_string(),
                )
            })?;

        for (id, candidate) in &candidates {
            if *id != chosen_id {
                let packet_count = candidate.recovery_slices.len()
                    + candidate.file_descriptions.len()
                    + candidate.slice_checksums.len();
                reporter.report(ReportEvent::OtherSetPacketSkipped {
                    set_id: *id,
                    packet_count,
                });
            }
        }

        let chosen = candidates
            .remove(&chosen_id)
            .expect("chosen id came from the map");
        let main = chosen.main.expect("usable candidates have a main packet");

        reporter.report(ReportEvent::PacketLoaded {
            kind: PacketKind::Main,
            detail: format!(
                "slice size {}, {} recovery files, {} non-recovery files",
                main.slice_size,
                main.file_ids.len(),
                main.non_recovery_file_ids.len()
            ),
        });
        if let Some(creator) = &chosen.creator {
            reporter.report(ReportEvent::PacketLoaded {
                kind: PacketKind::Creator,
                detail: creator.client(),
            });
        }
        for desc in chosen.file_descriptions.values() {
            reporter.report(ReportEvent::PacketLoaded {
                kind: PacketKind::FileDescription,
                detail: format!(
                    "{} ({} bytes, ID {})",
                    desc.file_name_string(),
                    desc.file_length,
                    desc.file_id
                ),
            });
        }
        for sums in chosen.slice_checksums.values() {
            reporter.report(ReportEvent::PacketLoaded {
                kind: PacketKind::InputFileSliceChecksum,
                detail: format!(
                    "file {} ({} slices)",
                    sums.file_id,
                    sums.slice_checksums.len()
                ),
            });
        }
        for packet in chosen.recovery_slices.values() {
            reporter.report(ReportEvent::PacketLoaded {
                kind: PacketKind::RecoverySlice,
                detail: format!(
                    "exponent {} ({} bytes)",
                    packet.exponent,
                    packet.recovery_data.len()
                ),
            });
        }

        Ok(PacketSet {
            set_id: chosen_id,
            creator: chosen.creator,
            main,
            file_descriptions: chosen.file_descriptions,
            slice_checksums: chosen.slice_checksums,
            recovery_slices: chosen.recovery_slices,
        })
    }

    /// The description for a recovery-set member, which every usable set
    /// must carry.
    pub fn description(&self, file_id: &FileId) -> Result<&FileDescriptionPacket> {
        self.file_descriptions.get(file_id).ok_or_else(|| {
            ParError::InsufficientCriticalData(format!(
                "main packet lists file {} but no description packet was found",
                file_id
            ))
        })
    }

    /// Slice count for one file under this set's slice size.
    pub fn slice_count(&self, file_length: u64) -> usize {
        if self.main.slice_size == 0 {
            return 0;
        }
        file_length.div_ceil(self.main.slice_size) as usize
    }

    /// Total input slice count across the recovery set, honoring main
    /// packet order.
    pub fn total_slice_count(&self) -> Result<usize> {
        let mut total = 0;
        for file_id in &self.main.file_ids {
            total += self.slice_count(self.description(file_id)?.file_length);
        }
        Ok(total)
    }
}
