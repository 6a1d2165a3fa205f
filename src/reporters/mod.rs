//! Structured progress reporting.
//!
//! The codecs never print; they emit [`ReportEvent`] records to a
//! [`Reporter`] sink. The console implementation formats them for humans
//! and the silent one discards them, which keeps output concerns out of the
//! core and lets tests capture event streams.

mod console;
mod silent;

pub use console::ConsoleReporter;
pub use silent::SilentReporter;

use std::path::PathBuf;

use crate::domain::{FileId, RecoverySetId};

/// One progress or diagnostic event from an encode, verify or repair run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    /// A data file was read (or failed to read) during load.
    DataFileLoaded {
        index: usize,
        total: usize,
        path: PathBuf,
        byte_count: usize,
        /// Slice-scan hit/miss counts; zero outside PAR2 decode.
        hits: usize,
        misses: usize,
        error: Option<String>,
    },
    /// A parity or recovery volume file was read.
    VolumeFileLoaded {
        index: usize,
        path: PathBuf,
        error: Option<String>,
    },
    /// An output volume or recovery file was written.
    VolumeFileWritten {
        index: usize,
        total: usize,
        path: PathBuf,
        data_byte_count: usize,
        byte_count: usize,
    },
    /// A typed packet passed validation and joined the working set.
    PacketLoaded { kind: PacketKind, detail: String },
    /// A packet of an unrecognized type was kept but ignored.
    UnknownPacketSkipped { packet_type: [u8; 16], byte_count: usize },
    /// Packets from a foreign recovery set were discarded.
    OtherSetPacketSkipped {
        set_id: RecoverySetId,
        packet_count: usize,
    },
    /// Two valid packets shared a key but disagreed on content; the first
    /// instance was kept.
    DuplicatePacketMismatch { kind: PacketKind, detail: String },
    /// A contiguous damaged byte range was localized inside a data file.
    CorruptDataChunk {
        file_id: FileId,
        path: PathBuf,
        start_offset: u64,
        end_offset: u64,
    },
    /// A data file's whole-file hash did not match its description.
    DataFileHashMismatch { file_id: FileId, path: PathBuf },
    /// A data file's length did not match its description.
    DataFileWrongByteCount { file_id: FileId, path: PathBuf },
    /// A repaired or restored data file was written.
    DataFileWritten {
        index: usize,
        total: usize,
        path: PathBuf,
        byte_count: usize,
        error: Option<String>,
    },
}

/// The packet kinds surfaced in events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Creator,
    Main,
    FileDescription,
    InputFileSliceChecksum,
    RecoverySlice,
}

impl std::fmt::Display for PacketKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PacketKind::Creator => "creator",
            PacketKind::Main => "main",
            PacketKind::FileDescription => "file description",
            PacketKind::InputFileSliceChecksum => "slice checksum",
            PacketKind::RecoverySlice => "recovery slice",
        };
        f.write_str(name)
    }
}

/// Sink for [`ReportEvent`] records.
pub trait Reporter: Send + Sync {
    fn report(&self, event: ReportEvent);
}

/// A reporter that appends events to a vector, for tests.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<ReportEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ReportEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Reporter for CollectingReporter {
    fn report(&self, event: ReportEvent) {
        self.events.lock().unwrap().push(event);
    }
}
