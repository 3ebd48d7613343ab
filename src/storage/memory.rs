//! RAM-backed storage for the desktop simulator and tests

use super::{FilePath, LogStorage, StorageError};

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// Files kept in a map keyed by their full path
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: BTreeMap<String, Vec<u8>>,
    unavailable: bool,
    writes: usize,
    /// Writes still allowed before the device starts failing
    write_budget: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the card being removed (`false`) or reinserted (`true`)
    pub fn set_ready(&mut self, ready: bool) {
        self.unavailable = !ready;
    }

    /// Number of successful append/write calls so far
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Make every append/write after the next `writes` fail with a device
    /// error while the medium still reports ready. `None` lifts the limit.
    pub fn fail_writes_after(&mut self, writes: Option<usize>) {
        self.write_budget = writes;
    }

    /// Contents of a file. Log files are Latin-1, so there is no text view.
    pub fn file_bytes(&self, path: &FilePath) -> Option<&[u8]> {
        self.files.get(&path.to_string()).map(Vec::as_slice)
    }

    /// Store raw bytes under a path, bypassing the ready check
    pub fn insert(&mut self, path: &FilePath, data: &[u8]) {
        self.files.insert(path.to_string(), data.to_vec());
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.unavailable {
            Err(StorageError::NotReady)
        } else {
            Ok(())
        }
    }

    fn check_write(&mut self) -> Result<(), StorageError> {
        self.check()?;
        match &mut self.write_budget {
            Some(0) => Err(StorageError::device("write rejected")),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl LogStorage for MemoryStorage {
    fn is_ready(&mut self) -> bool {
        !self.unavailable
    }

    fn append(&mut self, path: &FilePath, data: &[u8]) -> Result<(), StorageError> {
        self.check_write()?;
        self.files
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(data);
        self.writes += 1;
        Ok(())
    }

    fn write(&mut self, path: &FilePath, data: &[u8]) -> Result<(), StorageError> {
        self.check_write()?;
        self.files.insert(path.to_string(), data.to_vec());
        self.writes += 1;
        Ok(())
    }

    fn read(&mut self, path: &FilePath, buf: &mut Vec<u8>) -> Result<bool, StorageError> {
        self.check()?;
        match self.files.get(&path.to_string()) {
            Some(bytes) => {
                buf.extend_from_slice(bytes);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_accumulates() {
        let mut storage = MemoryStorage::new();
        let path = FilePath::root_file("A.TXT");
        storage.append(&path, b"ab").unwrap();
        storage.append(&path, b"cd").unwrap();
        assert_eq!(storage.file_bytes(&path), Some(&b"abcd"[..]));
        assert_eq!(storage.write_count(), 2);
    }

    #[test]
    fn test_not_ready_rejects() {
        let mut storage = MemoryStorage::new();
        storage.set_ready(false);
        let path = FilePath::root_file("A.TXT");
        assert_eq!(storage.append(&path, b"x"), Err(StorageError::NotReady));
        let mut buf = Vec::new();
        assert_eq!(storage.read(&path, &mut buf), Err(StorageError::NotReady));
        assert!(!storage.is_ready());
    }

    #[test]
    fn test_write_budget() {
        let mut storage = MemoryStorage::new();
        let path = FilePath::root_file("A.TXT");
        storage.fail_writes_after(Some(1));
        assert_eq!(storage.append(&path, b"a"), Ok(()));
        assert!(matches!(storage.append(&path, b"b"), Err(StorageError::Device(_))));
        assert!(storage.is_ready());
        storage.fail_writes_after(None);
        assert_eq!(storage.append(&path, b"c"), Ok(()));
        assert_eq!(storage.file_bytes(&path), Some(&b"ac"[..]));
        assert_eq!(storage.write_count(), 2);
    }

    #[test]
    fn test_read_missing_file() {
        let mut storage = MemoryStorage::new();
        let mut buf = Vec::new();
        assert_eq!(storage.read(&FilePath::root_file("NONE.TXT"), &mut buf), Ok(false));
        assert!(buf.is_empty());
    }
}
