//! Hashing helpers shared by the PAR1 and PAR2 code paths.
//!
//! All MD5 and CRC32 computation goes through these functions so the two
//! formats stay consistent about padding and identifier derivation.

use md5::{Digest, Md5};

use crate::domain::{Crc32Value, FileId, Md5Hash};

/// Number of leading bytes covered by the "16k hash" in both formats.
pub const SIXTEEN_K: usize = 16384;

/// Compute the MD5 of a byte slice.
#[inline]
pub fn md5(data: &[u8]) -> Md5Hash {
    Md5Hash::new(Md5::digest(data).into())
}

/// Compute the MD5 of the first 16 KiB of a byte slice (or all of it, if
/// shorter).
#[inline]
pub fn md5_16k(data: &[u8]) -> Md5Hash {
    md5(&data[..data.len().min(SIXTEEN_K)])
}

/// Compute the CRC32 (IEEE) of a byte slice.
#[inline]
pub fn crc32(data: &[u8]) -> Crc32Value {
    Crc32Value::new(crc32fast::hash(data))
}

/// Compute MD5 and CRC32 of `data` zero-padded to `block_size`.
///
/// Used for the trailing partial slice of a file; full slices pass
/// `block_size == data.len()` and pay no copy.
pub fn padded_checksums(data: &[u8], block_size: usize) -> (Md5Hash, Crc32Value) {
    if data.len() < block_size {
        let mut padded = vec![0u8; block_size];
        padded[..data.len()].copy_from_slice(data);
        (md5(&padded), crc32(&padded))
    } else {
        (md5(data), crc32(data))
    }
}

/// Derive a PAR2 file ID: MD5 over the 16k hash, the little-endian file
/// length, and the filename bytes as they appear in the file description
/// packet.
pub fn file_id(hash_16k: &Md5Hash, file_length: u64, filename: &[u8]) -> FileId {
    let mut hasher = Md5::new();
    hasher.update(hash_16k.as_bytes());
    hasher.update(file_length.to_le_bytes());
    hasher.update(filename);
    FileId::new(hasher.finalize().into())
}

/// The PAR1 set hash: MD5 over the per-file MD5s concatenated in ascending
/// byte order.
pub fn set_hash(file_hashes: &[Md5Hash]) -> Md5Hash {
    let mut sorted: Vec<&[u8; 16]> = file_hashes.iter().map(|h| h.as_bytes()).collect();
    sorted.sort_unstable();

    let mut hasher = Md5::new();
    for hash in sorted {
        hasher.update(hash);
    }
    Md5Hash::new(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_known_vector() {
        // MD5("") = d41d8cd98f00b204e9800998ecf8427e
        let expected = [
            0xd4, 0x1d, 0x8c, 0xd9, 0x8f, 0x00, 0xb2, 0x04, 0xe9, 0x80, 0x09, 0x98, 0xec, 0xf8,
            0x42, 0x7e,
        ];
        assert_eq!(*md5(b"").as_bytes(), expected);
    }

    #[test]
    fn md5_16k_truncates() {
        let data = vec![0x42u8; SIXTEEN_K + 100];
        assert_eq!(md5_16k(&data), md5(&data[..SIXTEEN_K]));

        let short = b"short file";
        assert_eq!(md5_16k(short), md5(short));
    }

    #[test]
    fn padded_checksums_match_manual_padding() {
        let data = b"tail";
        let mut padded = vec![0u8; 16];
        padded[..4].copy_from_slice(data);

        let (m, c) = padded_checksums(data, 16);
        assert_eq!(m, md5(&padded));
        assert_eq!(c, crc32(&padded));

        let (m, c) = padded_checksums(&padded, 16);
        assert_eq!(m, md5(&padded));
        assert_eq!(c, crc32(&padded));
    }

    #[test]
    fn file_id_depends_on_all_inputs() {
        let h = md5(b"first 16k");
        let id = file_id(&h, 100, b"a.dat");
        assert_ne!(id, file_id(&h, 101, b"a.dat"));
        assert_ne!(id, file_id(&h, 100, b"b.dat"));
        assert_eq!(id, file_id(&h, 100, b"a.dat"));
    }

    #[test]
    fn set_hash_is_order_independent() {
        let a = md5(b"a");
        let b = md5(b"b");
        assert_eq!(set_hash(&[a, b]), set_hash(&[b, a]));
        assert_ne!(set_hash(&[a, b]), set_hash(&[a, a]));
    }
}
