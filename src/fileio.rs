//! Minimal filesystem capability interface.
//!
//! Encoders and decoders take a `FileIO` implementation instead of touching
//! `std::fs` directly, so every multi-file operation can run against the
//! in-memory double in tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use rustc_hash::FxHashMap;

/// The filesystem operations the codecs need.
pub trait FileIO: Send + Sync {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()>;
    fn exists(&self, path: &Path) -> bool;

    /// All paths in `dir` whose file name starts with `prefix` and ends
    /// with `suffix`, sorted by name. Used to discover recovery volumes.
    fn find_with_prefix_and_suffix(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
    ) -> io::Result<Vec<PathBuf>>;
}

/// `FileIO` backed by the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFileIO;

impl FileIO for DiskFileIO {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        std::fs::write(path, data)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn find_with_prefix_and_suffix(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
    ) -> io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(prefix) && name.ends_with(suffix) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}

/// In-memory `FileIO` double for tests.
#[derive(Debug, Default)]
pub struct MemoryFileIO {
    files: Mutex<FxHashMap<PathBuf, Vec<u8>>>,
}

impl MemoryFileIO {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file into the in-memory tree.
    pub fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files.lock().unwrap().insert(path.into(), data.into());
    }

    /// Remove a file, returning its former contents.
    pub fn remove(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().remove(path)
    }

    /// Snapshot of the contents of a file, if present.
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }
}

impl FileIO for MemoryFileIO {
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{}", path.display())))
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    fn find_with_prefix_and_suffix(
        &self,
        dir: &Path,
        prefix: &str,
        suffix: &str,
    ) -> io::Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        let mut found: Vec<PathBuf> = files
            .keys()
            .filter(|p| {
                p.parent() == Some(dir)
                    && p.file_name().is_some_and(|n| {
                        let n = n.to_string_lossy();
                        n.starts_with(prefix) && n.ends_with(suffix)
                    })
            })
            .cloned()
            .collect();
        found.sort();
        Ok(found)
    }
}
