//! Human-readable event formatting.

use super::{ReportEvent, Reporter};

/// Formats events onto stdout, one line each, in the style of the
/// traditional par tools.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl ConsoleReporter {
    pub fn new() -> Self {
        ConsoleReporter
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, event: ReportEvent) {
        match event {
            ReportEvent::DataFileLoaded {
                index,
                total,
                path,
                byte_count,
                hits,
                misses,
                error,
            } => match error {
                Some(err) => println!(
                    "[{}/{}] Loading data file {:?} failed: {}",
                    index, total, path, err
                ),
                None if hits > 0 || misses > 0 => println!(
                    "[{}/{}] Loaded data file {:?} ({} bytes, {} hits, {} misses)",
                    index, total, path, byte_count, hits, misses
                ),
                None => println!(
                    "[{}/{}] Loaded data file {:?} ({} bytes)",
                    index, total, path, byte_count
                ),
            },
            ReportEvent::VolumeFileLoaded { index, path, error } => match error {
                Some(err) => println!("[{}] Loading volume file {:?} failed: {}", index, path, err),
                None => println!("[{}] Loaded volume file {:?}", index, path),
            },
            ReportEvent::VolumeFileWritten {
                index,
                total,
                path,
                data_byte_count,
                byte_count,
            } => println!(
                "[{}/{}] Wrote volume file {:?} ({} data bytes, {} bytes)",
                index, total, path, data_byte_count, byte_count
            ),
            ReportEvent::PacketLoaded { kind, detail } => {
                println!("Loaded {} packet: {}", kind, detail)
            }
            ReportEvent::UnknownPacketSkipped {
                packet_type,
                byte_count,
            } => println!(
                "Loaded unknown packet of type {:?} and byte count {}",
                String::from_utf8_lossy(&packet_type),
                byte_count
            ),
            ReportEvent::OtherSetPacketSkipped {
                set_id,
                packet_count,
            } => println!(
                "Skipped {} packets from foreign set {}",
                packet_count, set_id
            ),
            ReportEvent::DuplicatePacketMismatch { kind, detail } => println!(
                "Warning: conflicting duplicate {} packet ({}); keeping the first",
                kind, detail
            ),
            ReportEvent::CorruptDataChunk {
                file_id,
                path,
                start_offset,
                end_offset,
            } => println!(
                "Corrupt data chunk: {:?} (ID {}), bytes {} to {}",
                path,
                file_id,
                start_offset,
                end_offset - 1
            ),
            ReportEvent::DataFileHashMismatch { file_id, path } => {
                println!("Hash mismatch for {:?} (ID {})", path, file_id)
            }
            ReportEvent::DataFileWrongByteCount { file_id, path } => {
                println!("Wrong byte count for {:?} (ID {})", path, file_id)
            }
            ReportEvent::DataFileWritten {
                index,
                total,
                path,
                byte_count,
                error,
            } => match error {
                Some(err) => println!(
                    "[{}/{}] Writing data file {:?} failed: {}",
                    index, total, path, err
                ),
                None => println!(
                    "[{}/{}] Wrote data file {:?} ({} bytes)",
                    index, total, path, byte_count
                ),
            },
        }
    }
}
