//! PAR1 encode/verify/repair against the in-memory filesystem.

use std::path::{Path, PathBuf};

use parrs::fileio::MemoryFileIO;
use parrs::par1::{read_volume, Decoder, Encoder};
use parrs::reporters::SilentReporter;
use parrs::rs16::CancelToken;

const FILES: &[(&str, &[u8])] = &[
    ("work/a", &[0x01, 0x02, 0x03]),
    ("work/b", &[0x05, 0x06, 0x07, 0x08]),
    ("work/c", &[0x09, 0x0a, 0x0b, 0x0c]),
    ("work/d", &[0x0d, 0x0e]),
    ("work/e", &[]),
];

fn encode_set(io: &MemoryFileIO, volume_count: usize) {
    for (path, data) in FILES {
        io.insert(*path, data.to_vec());
    }
    let paths: Vec<PathBuf> = FILES.iter().map(|(p, _)| PathBuf::from(p)).collect();

    let reporter = SilentReporter;
    let mut encoder = Encoder::new(io, &reporter, paths, volume_count, 2).unwrap();
    encoder.load_file_data().unwrap();
    encoder.compute_parity_data(&CancelToken::new()).unwrap();
    encoder.write(Path::new("work/set.par")).unwrap();
}

#[test]
fn encode_then_verify() {
    let io = MemoryFileIO::new();
    encode_set(&io, 3);

    // Index plus three parity volumes, each with a 4-byte payload.
    for vol in ["work/set.p01", "work/set.p02", "work/set.p03"] {
        let bytes = io.get(Path::new(vol)).expect("parity volume exists");
        let volume = read_volume(&bytes).unwrap();
        assert_eq!(volume.data.len(), 4);
        assert_eq!(volume.entries.len(), 5);
    }

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/set.par"), 2).unwrap();
    decoder.load_file_data().unwrap();
    decoder.load_parity_data().unwrap();
    assert!(decoder.verify(&CancelToken::new()).unwrap());
}

#[test]
fn index_volume_has_populated_hashes() {
    let io = MemoryFileIO::new();
    encode_set(&io, 1);

    let bytes = io.get(Path::new("work/set.par")).unwrap();
    let volume = read_volume(&bytes).unwrap();

    assert_ne!(*volume.header.set_hash.as_bytes(), [0u8; 16]);
    for (entry, (_, data)) in volume.entries.iter().zip(FILES) {
        assert_eq!(entry.hash, parrs::checksum::md5(data));
        assert_eq!(entry.sixteen_k_hash, parrs::checksum::md5_16k(data));
        assert_eq!(entry.file_bytes, data.len() as u64);
    }
}

#[test]
fn repair_restores_deleted_file() {
    let io = MemoryFileIO::new();
    encode_set(&io, 3);
    io.remove(Path::new("work/b"));

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/set.par"), 2).unwrap();
    decoder.load_file_data().unwrap();
    decoder.load_parity_data().unwrap();
    assert!(!decoder.verify(&CancelToken::new()).unwrap());
    assert!(decoder.repair_is_possible());

    let repaired = decoder.repair(false, &CancelToken::new()).unwrap();
    assert_eq!(repaired, vec![PathBuf::from("work/b")]);
    assert_eq!(
        io.get(Path::new("work/b")).unwrap(),
        vec![0x05, 0x06, 0x07, 0x08]
    );
}

#[test]
fn repair_restores_corrupted_file() {
    let io = MemoryFileIO::new();
    encode_set(&io, 3);
    io.insert("work/c", vec![0x09, 0x0a, 0xFF, 0x0c]);

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/set.par"), 2).unwrap();
    decoder.load_file_data().unwrap();
    decoder.load_parity_data().unwrap();
    assert!(!decoder.verify(&CancelToken::new()).unwrap());

    let repaired = decoder.repair(false, &CancelToken::new()).unwrap();
    assert_eq!(repaired, vec![PathBuf::from("work/c")]);
    assert_eq!(
        io.get(Path::new("work/c")).unwrap(),
        vec![0x09, 0x0a, 0x0b, 0x0c]
    );
}

#[test]
fn second_repair_is_a_noop() {
    let io = MemoryFileIO::new();
    encode_set(&io, 3);
    io.remove(Path::new("work/d"));

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/set.par"), 2).unwrap();
    decoder.load_file_data().unwrap();
    decoder.load_parity_data().unwrap();
    assert_eq!(decoder.repair(false, &CancelToken::new()).unwrap().len(), 1);

    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/set.par"), 2).unwrap();
    decoder.load_file_data().unwrap();
    decoder.load_parity_data().unwrap();
    assert!(decoder.verify(&CancelToken::new()).unwrap());
    assert!(decoder.repair(false, &CancelToken::new()).unwrap().is_empty());
}

#[test]
fn too_many_missing_files_cannot_be_repaired() {
    let io = MemoryFileIO::new();
    encode_set(&io, 1);
    io.remove(Path::new("work/a"));
    io.remove(Path::new("work/b"));

    let reporter = SilentReporter;
    let mut decoder = Decoder::new(&io, &reporter, Path::new("work/set.par"), 2).unwrap();
    decoder.load_file_data().unwrap();
    decoder.load_parity_data().unwrap();
    assert!(!decoder.verify(&CancelToken::new()).unwrap());
    assert!(!decoder.repair_is_possible());
    assert!(matches!(
        decoder.repair(false, &CancelToken::new()),
        Err(parrs::ParError::InsufficientRecovery)
    ));
}

#[test]
fn rejects_index_with_wrong_volume_number() {
    let io = MemoryFileIO::new();
    encode_set(&io, 1);

    // Point the decoder at a parity volume instead of the index.
    let reporter = SilentReporter;
    let err = Decoder::new(&io, &reporter, Path::new("work/set.p01"), 1).unwrap_err();
    assert!(err.to_string().contains("volume number"));
}
