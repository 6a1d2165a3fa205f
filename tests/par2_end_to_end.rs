//! PAR2 encode/verify/repair against the in-memory filesystem.

use std::path::{Path, PathBuf};

use parrs::checksum;
use parrs::fileio::MemoryFileIO;
use parrs::packets::{parse_packets, Packet};
use parrs::par2::{Decoder, Encoder};
use parrs::reporters::{CollectingReporter, ReportEvent, SilentReporter};
use parrs::rs16::CancelToken;
use parrs::ParError;

fn encode(
    io: &MemoryFileIO,
    files: &[(&str, Vec<u8>)],
    slice_bytes: usize,
    recovery: usize,
) -> Vec<PathBuf> {
    for (path, data) in files {
        io.insert(*path, data.clone());
    }
    let paths: Vec<PathBuf> = files.iter().map(|(p, _)| PathBuf::from(p)).collect();

    let reporter = SilentReporter;
    let mut encoder =
        Encoder::new(io, &reporter, paths, slice_bytes, recovery, 2).unwrap();
    encoder.load_file_data().unwrap();
    encoder.compute_recovery_data(&CancelToken::new()).unwrap();
    encoder.write(Path::new("work/x.par2")).unwrap()
}

fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31) ^ seed).collect()
}

#[test]
fn small_encode_emits_expected_volumes() {
    let io = MemoryFileIO::new();
    let written = encode(&io, &[("work/x", patterned(2000, 1))], 2000, 3);

    assert_eq!(
        written,
        vec![
            PathBuf::from("work/x.par2"),
            PathBuf::from("work/x.vol00+01.par2"),
            PathBuf::from("work/x.vol01+01.par2"),
            PathBuf::from("work/x.vol02+01.par2"),
        ]
    );

    // Each recovery file carries exactly one recovery slice, labeled with
    // the first three exponents coprime to 65535.
    let expected_exponents = [1u32, 2, 4];
    for (i, vol) in written[1..].iter().enumerate() {
        let bytes = io.get(vol).unwrap();
        let packets = parse_packets(&bytes, &SilentReporter);
        let exponents: Vec<u32> = packets
            .iter()
            .filter_map(|p| match p {
                Packet::RecoverySlice(r) => Some(r.exponent),
                _ => None,
            })
            .collect();
        assert_eq!(exponents, vec![expected_exponents[i]]);

        // Critical packets are repeated ahead of the recovery slices.
        assert!(packets.iter().any(|p| matches!(p, Packet::Main(_))));
        assert!(packets.iter().any(|p| matches!(p, Packet::Creator(_))));
        assert!(packets
            .iter()
            .any(|p| matches!(p, Packet::FileDescription(_))));
        assert!(packets
            .iter()
            .any(|p| matches!(p, Packet::InputFileSliceChecksum(_))));
    }
}

#[test]
fn power_of_two_layout_groups_recovery_slices() {
    let io = MemoryFileIO::new();
    io.insert("work/x", patterned(2000, 1));

    let reporter = SilentReporter;
    let mut encoder = Encoder::new(
        &io,
        &reporter,
        vec![PathBuf::from("work/x")],
        2000,
        7,
        2,
    )
    .unwrap()
    .with_layout(parrs::par2::RecoveryFileLayout::PowerOfTwo);
    encoder.load_file_data().unwrap();
    encoder.compute_recovery_data(&CancelToken::new()).unwrap();
    let written = encoder.write(Path::new("work/x.par2")).unwrap();

    assert_eq!(
        written,
        vec![
            PathBuf::from("work/x.par2"),
            PathBuf::from("work/x.vol00+01.par2"),
            PathBuf::from("work/x.vol01+02.par2"),
            PathBuf::from("work/x.vol03+04.par2"),
        ]
    );

    // The grouped set still verifies and repairs.
    io.remove(Path::new("work/x"));
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();
    assert!(decoder.verify().unwrap());
    assert_eq!(decoder.repair(false, &CancelToken::new()).unwrap().len(), 1);
    assert_eq!(io.get(Path::new("work/x")).unwrap(), patterned(2000, 1));
}

#[test]
fn verify_clean_set_needs_no_repair() {
    let io = MemoryFileIO::new();
    encode(&io, &[("work/x", patterned(5000, 2))], 2000, 3);

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();
    assert!(!decoder.verify().unwrap());
}

#[test]
fn corruption_is_localized_and_repaired() {
    let io = MemoryFileIO::new();
    let original = patterned(2000, 3);
    encode(&io, &[("work/x", original.clone())], 2000, 3);

    let mut corrupted = original.clone();
    corrupted[1500] ^= 0xFF;
    io.insert("work/x", corrupted);

    let reporter = CollectingReporter::new();
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();
    assert!(decoder.verify().unwrap());

    // The single corrupt chunk covers the slice containing offset 1500.
    let chunks: Vec<(u64, u64)> = reporter
        .events()
        .iter()
        .filter_map(|e| match e {
            ReportEvent::CorruptDataChunk {
                start_offset,
                end_offset,
                ..
            } => Some((*start_offset, *end_offset)),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![(0, 2000)]);

    let repaired = decoder.repair(false, &CancelToken::new()).unwrap();
    assert_eq!(repaired, vec![PathBuf::from("work/x")]);
    assert_eq!(io.get(Path::new("work/x")).unwrap(), original);
}

#[test]
fn multi_slice_corruption_repairs_damaged_slices_only_from_recovery() {
    let io = MemoryFileIO::new();
    let original = patterned(64, 4);
    // 16 slices of 4 bytes, 3 recovery slices.
    encode(&io, &[("work/x", original.clone())], 4, 3);

    let mut corrupted = original.clone();
    corrupted[10] ^= 0x01; // slice 2
    corrupted[42] ^= 0x80; // slice 10
    io.insert("work/x", corrupted);

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();
    assert!(decoder.verify().unwrap());

    decoder.repair(false, &CancelToken::new()).unwrap();
    assert_eq!(io.get(Path::new("work/x")).unwrap(), original);

    assert_eq!(
        checksum::md5(&io.get(Path::new("work/x")).unwrap()),
        checksum::md5(&original)
    );
}

#[test]
fn missing_file_is_rebuilt_from_recovery() {
    let io = MemoryFileIO::new();
    let a = patterned(7000, 5);
    let b = patterned(3500, 6);
    encode(
        &io,
        &[("work/a.dat", a.clone()), ("work/b.dat", b.clone())],
        2000,
        4,
    );
    io.remove(Path::new("work/b.dat"));

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();
    assert!(decoder.verify().unwrap());

    let repaired = decoder.repair(false, &CancelToken::new()).unwrap();
    assert_eq!(repaired, vec![PathBuf::from("work/b.dat")]);
    assert_eq!(io.get(Path::new("work/b.dat")).unwrap(), b);
    assert_eq!(io.get(Path::new("work/a.dat")).unwrap(), a);
}

#[test]
fn displaced_slices_are_found_by_the_sliding_scan() {
    let io = MemoryFileIO::new();
    let original = patterned(64, 7);
    encode(&io, &[("work/x", original.clone())], 4, 1);

    // Prepend garbage; every slice survives but shifted by five bytes.
    let mut shifted = vec![0xEE, 0xEE, 0xEE, 0xEE, 0xEE];
    shifted.extend_from_slice(&original);
    io.insert("work/x", shifted);

    let reporter = CollectingReporter::new();
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();

    let hits = reporter
        .events()
        .iter()
        .find_map(|e| match e {
            ReportEvent::DataFileLoaded { hits, .. } if *hits > 0 => Some(*hits),
            _ => None,
        })
        .expect("scan reported hits");
    assert_eq!(hits, 16);

    // No slice is missing, so repair succeeds with a single recovery slice
    // untouched.
    assert!(decoder.verify().unwrap());
    decoder.repair(false, &CancelToken::new()).unwrap();
    assert_eq!(io.get(Path::new("work/x")).unwrap(), original);
}

#[test]
fn insufficient_recovery_is_detected() {
    let io = MemoryFileIO::new();
    // Two files, four slices each, three recovery slices.
    let a = patterned(16, 8);
    let b = patterned(16, 9);
    encode(
        &io,
        &[("work/a.dat", a.clone()), ("work/b.dat", b.clone())],
        4,
        3,
    );

    // Corrupt five slices across the two files.
    let mut bad_a = a.clone();
    bad_a[0] ^= 0xFF;
    bad_a[5] ^= 0xFF;
    bad_a[9] ^= 0xFF;
    io.insert("work/a.dat", bad_a);
    let mut bad_b = b.clone();
    bad_b[2] ^= 0xFF;
    bad_b[14] ^= 0xFF;
    io.insert("work/b.dat", bad_b);

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();
    assert!(matches!(
        decoder.verify(),
        Err(ParError::InsufficientRecovery)
    ));
    assert!(matches!(
        decoder.repair(false, &CancelToken::new()),
        Err(ParError::InsufficientRecovery)
    ));
}

#[test]
fn second_repair_is_a_noop() {
    let io = MemoryFileIO::new();
    let original = patterned(6000, 10);
    encode(&io, &[("work/x", original.clone())], 2000, 3);
    io.remove(Path::new("work/x"));

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();
    assert_eq!(decoder.repair(false, &CancelToken::new()).unwrap().len(), 1);
    assert_eq!(io.get(Path::new("work/x")).unwrap(), original);

    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();
    assert!(!decoder.verify().unwrap());
    assert!(decoder.repair(false, &CancelToken::new()).unwrap().is_empty());
}

#[test]
fn repair_with_check_parity_accepts_consistent_set() {
    let io = MemoryFileIO::new();
    encode(&io, &[("work/x", patterned(4000, 11))], 2000, 2);

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/x.par2"), 2).unwrap();
    decoder.load_file_data().unwrap();
    assert!(decoder.repair(true, &CancelToken::new()).unwrap().is_empty());
}

#[test]
fn duplicate_input_file_ids_are_fatal() {
    let io = MemoryFileIO::new();
    // Same name, same content, different directories: identical file IDs.
    io.insert("work/x", patterned(100, 12));
    io.insert("other/x", patterned(100, 12));

    let reporter = SilentReporter;
    let mut encoder = Encoder::new(
        &io,
        &reporter,
        vec![PathBuf::from("work/x"), PathBuf::from("other/x")],
        2000,
        1,
        1,
    )
    .unwrap();
    assert!(matches!(
        encoder.load_file_data(),
        Err(ParError::DuplicateFileId { .. })
    ));
}
