//! Storage medium abstraction and on-disk layout
//!
//! The logger treats the medium as a single-session resource: every call
//! opens what it needs, acts, and closes again before returning. Nothing is
//! held open between scheduler iterations.

pub mod memory;
pub mod sd_card;

pub use memory::MemoryStorage;
pub use sd_card::{ClockTimeSource, SdCardStorage};

use core::fmt::{self, Display, Write};

use thiserror_no_std::Error;

use crate::channel::ChannelId;
use crate::time::Date;

use alloc::vec::Vec;

/// Maximum directory depth below the volume root
pub const MAX_PATH_DEPTH: usize = 4;

/// FAT short name capacity for a directory component
pub type DirName = heapless::String<8>;

/// FAT 8.3 file name capacity
pub type FileName = heapless::String<12>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage medium not ready")]
    NotReady,
    #[error("File or directory not found")]
    NotFound,
    #[error("Path component too long")]
    PathTooLong,
    #[error("Device error: {0}")]
    Device(heapless::String<64>),
}

impl StorageError {
    /// Wrap a backend error, truncating its debug text to fit
    pub fn device(err: impl fmt::Debug) -> Self {
        let mut text = heapless::String::<64>::new();
        let _ = write!(text, "{:?}", err);
        Self::Device(text)
    }
}

/// A file location: directories from the volume root, then the file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePath {
    dirs: heapless::Vec<DirName, MAX_PATH_DEPTH>,
    name: FileName,
}

fn component<const N: usize>(text: &str) -> Result<heapless::String<N>, StorageError> {
    let mut out = heapless::String::new();
    out.push_str(text).map_err(|_| StorageError::PathTooLong)?;
    Ok(out)
}

impl FilePath {
    /// A file directly in the volume root
    pub fn root_file(name: &str) -> Self {
        let mut file = FileName::new();
        // Truncation keeps the 8.3 limit; root file names are compile-time constants
        for c in name.chars() {
            if file.push(c).is_err() {
                break;
            }
        }
        Self {
            dirs: heapless::Vec::new(),
            name: file,
        }
    }

    /// Daily log file of a channel:
    /// `<ROOT>/<Cn>/<YYYY>/<MM>/<Cn><DD><MM>.TXT`
    pub fn log_file(channel: ChannelId, date: Date) -> Result<Self, StorageError> {
        let cn = channel.name();
        let mut dirs = heapless::Vec::new();
        let mut year = DirName::new();
        let mut month = DirName::new();
        write!(year, "{:04}", date.year).map_err(|_| StorageError::PathTooLong)?;
        write!(month, "{:02}", date.month).map_err(|_| StorageError::PathTooLong)?;
        for part in [component(channel.category.root_dir())?, component(&cn)?, year, month] {
            dirs.push(part).map_err(|_| StorageError::PathTooLong)?;
        }
        let mut name = FileName::new();
        write!(name, "{}{:02}{:02}.TXT", cn, date.day, date.month)
            .map_err(|_| StorageError::PathTooLong)?;
        Ok(Self { dirs, name })
    }

    pub fn dirs(&self) -> impl Iterator<Item = &str> {
        self.dirs.iter().map(|d| d.as_str())
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for dir in &self.dirs {
            write!(f, "{}/", dir)?;
        }
        f.write_str(&self.name)
    }
}

/// Storage medium used by the log writer, retrieval and config persistence
pub trait LogStorage {
    /// Whether the medium can be used right now. Polled by the writer before
    /// each drain step; a `false` only postpones work.
    fn is_ready(&mut self) -> bool;

    /// Append to a file, creating it and any missing directories
    fn append(&mut self, path: &FilePath, data: &[u8]) -> Result<(), StorageError>;

    /// Replace a file's contents, creating it and any missing directories
    fn write(&mut self, path: &FilePath, data: &[u8]) -> Result<(), StorageError>;

    /// Append the file's contents to `buf`. `Ok(false)` when it does not exist.
    fn read(&mut self, path: &FilePath, buf: &mut Vec<u8>) -> Result<bool, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelCategory;
    use alloc::string::ToString;

    #[test]
    fn test_log_file_layout() {
        let path = FilePath::log_file(ChannelId::sms(0), Date::new(2026, 10, 16)).unwrap();
        assert_eq!(path.to_string(), "SMS/A1/2026/10/A11610.TXT");

        let derived = ChannelId::new(ChannelCategory::DerivedSms, 9).unwrap();
        let path = FilePath::log_file(derived, Date::new(2026, 3, 5)).unwrap();
        assert_eq!(path.to_string(), "DSMS/D2/2026/03/D20503.TXT");
        assert_eq!(path.dirs().count(), 4);
    }

    #[test]
    fn test_root_file() {
        let path = FilePath::root_file("CONFIG.BIN");
        assert_eq!(path.to_string(), "CONFIG.BIN");
        assert_eq!(path.dirs().count(), 0);
    }
}
